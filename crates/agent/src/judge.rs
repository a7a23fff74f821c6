//! Sufficiency judge: decides whether the gathered evidence answers the query.

use hybridrag_core::message::Message;
use hybridrag_core::provider::{Provider, ProviderRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const JUDGE_SYSTEM_PROMPT: &str = "You are an expert at evaluating if information sufficiently answers user queries. \
Be strict - if the user asks for specific data, you must have actual data results, not just descriptions. \
Respond only with valid JSON.";

/// The judge's decision for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SufficiencyVerdict {
    #[serde(default)]
    pub sufficient: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub final_answer: Option<String>,
}

impl SufficiencyVerdict {
    pub fn insufficient(reasoning: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            reasoning: reasoning.into(),
            final_answer: None,
        }
    }

    /// The answer, when the verdict ends the run.
    pub fn answer(&self) -> Option<&str> {
        if !self.sufficient {
            return None;
        }
        self.final_answer.as_deref().filter(|a| !a.trim().is_empty())
    }

    pub fn is_done(&self) -> bool {
        self.answer().is_some()
    }
}

/// The user prompt sent to the judge.
pub fn evaluation_prompt(query: &str, transcript: &str) -> String {
    format!(
        r#"Original user query: "{query}"

Information gathered so far: {transcript}

Evaluate if the gathered information is sufficient to provide a complete and accurate answer to the original user query.

IMPORTANT CRITERIA:
- General descriptions or explanations of how to query data are NOT sufficient for data retrieval requests
- Only consider it sufficient if you have concrete data that directly answers the user's question

Respond with JSON in this format:
{{
    "sufficient": true/false,
    "reasoning": "explanation of why the information is or isn't sufficient",
    "final_answer": "if sufficient, provide a comprehensive answer to the original query, otherwise null"
}}"#
    )
}

/// Parse the judge's reply. Anything that is not a verdict object counts as
/// insufficient.
pub fn parse_verdict(text: &str) -> SufficiencyVerdict {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    match serde_json::from_str::<SufficiencyVerdict>(body.trim()) {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "Judge reply was not a valid verdict");
            SufficiencyVerdict::insufficient("Failed to evaluate")
        }
    }
}

#[derive(Clone)]
pub struct SufficiencyJudge {
    provider: Arc<dyn Provider>,
    model: String,
}

impl SufficiencyJudge {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Ask the judge about `transcript`. Provider failures are logged and
    /// reported as insufficient so the loop keeps going.
    pub async fn evaluate(&self, query: &str, transcript: &str) -> SufficiencyVerdict {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![
                Message::system(JUDGE_SYSTEM_PROMPT),
                Message::user(evaluation_prompt(query, transcript)),
            ],
        )
        .with_json_mode();

        match self.provider.complete(request).await {
            Ok(response) => {
                let verdict = parse_verdict(&response.message.content);
                debug!(sufficient = verdict.sufficient, reasoning = %verdict.reasoning, "Judge verdict");
                verdict
            }
            Err(e) => {
                warn!(error = %e, model = %self.model, "Judge request failed");
                SufficiencyVerdict::insufficient("Failed to evaluate")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;

    #[test]
    fn parses_sufficient_verdict() {
        let v = parse_verdict(r#"{"sufficient": true, "reasoning": "rows found", "final_answer": "42 orders"}"#);
        assert!(v.is_done());
        assert_eq!(v.answer(), Some("42 orders"));
    }

    #[test]
    fn sufficient_without_answer_is_not_done() {
        let v = parse_verdict(r#"{"sufficient": true, "reasoning": "x", "final_answer": null}"#);
        assert!(!v.is_done());
        let blank = parse_verdict(r#"{"sufficient": true, "final_answer": "  "}"#);
        assert!(!blank.is_done());
    }

    #[test]
    fn answer_ignored_when_insufficient() {
        let v = parse_verdict(r#"{"sufficient": false, "reasoning": "x", "final_answer": "guess"}"#);
        assert_eq!(v.answer(), None);
    }

    #[test]
    fn malformed_reply_is_insufficient() {
        let v = parse_verdict("I think so, yes");
        assert_eq!(v, SufficiencyVerdict::insufficient("Failed to evaluate"));
        let wrong_type = parse_verdict(r#"{"sufficient": "maybe"}"#);
        assert!(!wrong_type.sufficient);
    }

    #[test]
    fn fenced_json_accepted() {
        let v = parse_verdict("```json\n{\"sufficient\": true, \"final_answer\": \"yes\"}\n```");
        assert!(v.is_done());
    }

    #[test]
    fn prompt_embeds_query_and_history() {
        let prompt = evaluation_prompt("how many orders?", "Tool result: [1,2]");
        assert!(prompt.contains(r#"Original user query: "how many orders?""#));
        assert!(prompt.contains("Information gathered so far: Tool result: [1,2]"));
        assert!(prompt.contains(r#""sufficient": true/false"#));
    }

    #[tokio::test]
    async fn judge_uses_json_mode() {
        let provider = Arc::new(ScriptedProvider::text(r#"{"sufficient": false, "reasoning": "no data"}"#));
        let judge = SufficiencyJudge::new(provider.clone(), "gpt-4o-mini");
        let verdict = judge.evaluate("q", "history").await;
        assert!(!verdict.sufficient);
        assert_eq!(verdict.reasoning, "no data");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_is_insufficient() {
        let judge = SufficiencyJudge::new(Arc::new(ScriptedProvider::failing()), "gpt-4o-mini");
        let verdict = judge.evaluate("q", "history").await;
        assert_eq!(verdict.reasoning, "Failed to evaluate");
    }
}
