//! Prior conversation turns rendered as a context table.
//!
//! Turns are grouped into question/answer pairs. The oldest pairs are kept
//! (no recency bias) and added one at a time while the rendered text stays
//! under the token ceiling.

use hybridrag_core::message::Role;
use hybridrag_core::search::ConversationHistoryOptions;
use serde::{Deserialize, Serialize};

use crate::packer::ContextTable;
use crate::token::TokenCounter;

/// One role-tagged turn of a prior conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// A user question and the assistant answers that followed it.
#[derive(Debug, Clone, PartialEq)]
pub struct QaTurn {
    pub user_query: String,
    pub assistant_answers: Vec<String>,
}

/// Ordered prior turns supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_turn(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Group turns into QA pairs. Assistant turns before the first user turn
    /// are dropped; system turns are ignored.
    pub fn qa_turns(&self) -> Vec<QaTurn> {
        let mut pairs: Vec<QaTurn> = Vec::new();
        for turn in &self.turns {
            match turn.role {
                Role::User => pairs.push(QaTurn {
                    user_query: turn.content.clone(),
                    assistant_answers: Vec::new(),
                }),
                Role::Assistant => {
                    if let Some(last) = pairs.last_mut() {
                        last.assistant_answers.push(turn.content.clone());
                    }
                }
                Role::System => {}
            }
        }
        pairs
    }

    /// Render the history as `-----{name}-----` followed by a `turn|content` table.
    ///
    /// Returns an empty string and an empty table when nothing fits.
    pub fn build_context(
        &self,
        options: &ConversationHistoryOptions,
        delimiter: &str,
        max_tokens: usize,
        counter: &dyn TokenCounter,
    ) -> (String, ContextTable) {
        let mut pairs = self.qa_turns();
        pairs.truncate(options.max_qa_turns);

        let mut accepted = ContextTable::new(vec!["turn".into(), "content".into()]);
        if pairs.is_empty() {
            return (String::new(), accepted);
        }

        let title = format!("-----{}-----\n", options.context_name);
        let mut candidate = accepted.clone();

        for pair in pairs {
            candidate
                .rows
                .push(vec![Role::User.to_string(), pair.user_query]);
            if !options.include_user_turns_only && !pair.assistant_answers.is_empty() {
                candidate
                    .rows
                    .push(vec![Role::Assistant.to_string(), pair.assistant_answers.join("\n")]);
            }

            let text = format!("{title}{}", candidate.to_csv(delimiter));
            if counter.count(&text) > max_tokens {
                break;
            }
            accepted = candidate.clone();
        }

        if accepted.is_empty() {
            return (String::new(), accepted);
        }
        let text = format!("{title}{}", accepted.to_csv(delimiter));
        (text, accepted)
    }
}
