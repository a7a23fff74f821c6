//! Shared test helpers for agent tests.

use hybridrag_core::error::ProviderError;
use hybridrag_core::message::{Message, MessageToolCall};
use hybridrag_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A provider that returns a sequence of scripted responses.
///
/// Each call returns the next response; once the script runs out the last
/// response repeats. An empty script fails every call.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => Err(ProviderError::Network("scripted provider has no responses".into())),
            1 => Ok(responses[0].clone()),
            _ => Ok(responses.remove(0)),
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response requesting the given tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    let mut response = make_text_response("");
    response.message.tool_calls = tool_calls;
    response
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// A judge reply.
pub fn make_verdict(sufficient: bool, final_answer: Option<&str>) -> ProviderResponse {
    make_text_response(
        &serde_json::json!({
            "sufficient": sufficient,
            "reasoning": if sufficient { "concrete data found" } else { "need more data" },
            "final_answer": final_answer,
        })
        .to_string(),
    )
}
