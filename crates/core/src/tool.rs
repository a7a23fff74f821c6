//! Tool call and result types shared by the dispatcher and the agent loop.
//!
//! Tools are what give the agent its retrieval reach: graph searches over
//! community reports and chunks, and schema/SQL access to relational tables.

use serde::{Deserialize, Serialize};

/// Which backend family a tool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolClass {
    /// Relational tables
    Structured,
    /// The document / entity / community graph
    Unstructured,
}

impl ToolClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolClass::Structured => "structured",
            ToolClass::Unstructured => "unstructured",
        }
    }
}

impl std::fmt::Display for ToolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Borrow a string argument by key.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// The result of a tool execution.
///
/// `data` is the structured payload folded back into the agent history;
/// `output` is its compact JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn from_value(call_id: impl Into<String>, success: bool, value: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            success,
            output: value.to_string(),
            data: Some(value),
        }
    }

    /// A failure envelope: `{"error": <message>}`.
    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::from_value(call_id, false, serde_json::json!({ "error": message.into() }))
    }

    /// The payload as JSON, falling back to the raw output text.
    pub fn payload(&self) -> serde_json::Value {
        self.data
            .clone()
            .unwrap_or_else(|| serde_json::Value::String(self.output.clone()))
    }
}
