//! The per-run reasoning history.
//!
//! Append-only: the system prompt and the user query first, then one entry
//! per step. Every appended entry is truncated so a single large tool result
//! cannot crowd out the rest of the conversation.

use hybridrag_core::message::{Conversation, Message};
use hybridrag_core::tool::ToolResult;

pub const TRUNCATION_SUFFIX: &str = "... [truncated]";
pub const TOOL_RESULT_PREFIX: &str = "Tool result: ";

/// Keep the first `max_chars` characters, marking the cut.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_SUFFIX}", &content[..byte_idx]),
        None => content.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningHistory {
    conversation: Conversation,
    max_chars: usize,
}

impl ReasoningHistory {
    pub fn new(system_prompt: &str, query: &str, max_chars: usize) -> Self {
        let mut conversation = Conversation::new();
        conversation.push(Message::system(system_prompt));
        conversation.push(Message::user(query));
        Self {
            conversation,
            max_chars,
        }
    }

    /// Append a tool's payload as `Tool result: <json>`.
    pub fn push_tool_result(&mut self, result: &ToolResult) {
        let json = result.payload().to_string();
        let content = format!("{TOOL_RESULT_PREFIX}{}", truncate_content(&json, self.max_chars));
        self.conversation.push(Message::assistant(content));
    }

    /// Append a direct reply from the reasoning model.
    pub fn push_message(&mut self, text: &str) {
        self.conversation
            .push(Message::assistant(truncate_content(text, self.max_chars)));
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    /// Every entry's content, newline joined, for the judge.
    pub fn transcript(&self) -> String {
        self.conversation.transcript()
    }

    pub fn len(&self) -> usize {
        self.conversation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversation.is_empty()
    }

    pub fn conversation_id(&self) -> String {
        self.conversation.id.to_string()
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridrag_core::message::Role;
    use serde_json::json;

    #[test]
    fn short_content_untouched() {
        assert_eq!(truncate_content("hello", 2000), "hello");
        assert_eq!(truncate_content("", 10), "");
    }

    #[test]
    fn long_content_cut_with_suffix() {
        let long = "a".repeat(2500);
        let cut = truncate_content(&long, 2000);
        assert_eq!(cut.len(), 2000 + TRUNCATION_SUFFIX.len());
        assert!(cut.ends_with("... [truncated]"));
        assert_eq!(truncate_content(&"b".repeat(2000), 2000).len(), 2000);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate_content(&text, 3);
        assert_eq!(cut, format!("ééé{TRUNCATION_SUFFIX}"));
    }

    #[test]
    fn starts_with_prompt_and_query() {
        let history = ReasoningHistory::new("system prompt", "who chairs the board?", 2000);
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages()[1].role, Role::User);
        assert_eq!(history.transcript(), "system prompt\nwho chairs the board?");
    }

    #[test]
    fn tool_results_prefixed_and_truncated() {
        let mut history = ReasoningHistory::new("s", "q", 20);
        let result = ToolResult::from_value("c1", true, json!({"rows": "x".repeat(100)}));
        history.push_tool_result(&result);
        let last = &history.messages()[2];
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.starts_with("Tool result: {\"rows\":\"xxxx"));
        assert!(last.content.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(last.content.chars().count(), TOOL_RESULT_PREFIX.len() + 20 + TRUNCATION_SUFFIX.len());
    }

    #[test]
    fn messages_appended_in_order() {
        let mut history = ReasoningHistory::new("s", "q", 2000);
        history.push_message("thinking about tables");
        history.push_message("done");
        assert_eq!(history.len(), 4);
        assert!(history.transcript().ends_with("thinking about tables\ndone"));
    }
}
