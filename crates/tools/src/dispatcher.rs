//! Routes a model-requested tool call to the service for its class.
//!
//! Dispatch never fails: unknown names, bad arguments and backend errors all
//! come back as a `ToolResult` with `success = false` and an `error` field.

use hybridrag_core::error::{Error, ToolError};
use hybridrag_core::provider::ToolDefinition;
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::search::DEFAULT_RESPONSE_TYPE;
use hybridrag_core::tool::{ToolCall, ToolResult};
use serde_json::{Value, json};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::catalog::{BuiltinTool, ToolCatalog};
use crate::structured::{DEFAULT_SAMPLE_ROWS, StructuredService};
use crate::unstructured::UnstructuredService;

pub struct ToolDispatcher {
    catalog: ToolCatalog,
    structured: StructuredService,
    unstructured: UnstructuredService,
}

fn required<'a>(call: &'a ToolCall, key: &str) -> Result<&'a str, Error> {
    call.str_arg(key).ok_or_else(|| {
        Error::Tool(ToolError::InvalidArguments(format!(
            "{} requires a string '{key}' argument",
            call.name
        )))
    })
}

impl ToolDispatcher {
    pub fn new(catalog: ToolCatalog, structured: StructuredService, unstructured: UnstructuredService) -> Self {
        Self {
            catalog,
            structured,
            unstructured,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.catalog.definitions()
    }

    pub fn structured(&self) -> &StructuredService {
        &self.structured
    }

    pub fn unstructured(&self) -> &UnstructuredService {
        &self.unstructured
    }

    /// Execute `call` on behalf of `scope`.
    pub async fn dispatch(&self, call: &ToolCall, scope: &ScopeKey) -> ToolResult {
        let Some(tool) = self.catalog.lookup(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return ToolResult::error(&call.id, format!("Unknown function: {}", call.name));
        };

        let started = Instant::now();
        let outcome = self.execute(tool, call, scope).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                let success = value.get("success").and_then(Value::as_bool).unwrap_or(true);
                info!(tool = %tool, class = %tool.class(), success, duration_ms, "Tool executed");
                ToolResult::from_value(&call.id, success, value)
            }
            Err(e) => {
                error!(tool = %tool, class = %tool.class(), error = %e, duration_ms, "Tool failed");
                ToolResult::from_value(&call.id, false, json!({ "success": false, "error": e.to_string() }))
            }
        }
    }

    async fn execute(&self, tool: BuiltinTool, call: &ToolCall, scope: &ScopeKey) -> Result<Value, Error> {
        let response_type = || call.str_arg("response_type").unwrap_or(DEFAULT_RESPONSE_TYPE);

        match tool {
            BuiltinTool::GlobalSearch => {
                self.unstructured
                    .global_search(required(call, "query")?, response_type(), scope)
                    .await
            }
            BuiltinTool::LocalSearch => {
                self.unstructured
                    .local_search(
                        required(call, "query")?,
                        response_type(),
                        call.str_arg("document_type"),
                        scope,
                    )
                    .await
            }
            BuiltinTool::RunCypherQuery => {
                self.unstructured
                    .run_cypher_query(required(call, "query")?, scope)
                    .await
            }
            BuiltinTool::GetAllTables => Ok(self.structured.list_tables().await?),
            BuiltinTool::GetTableSchema => Ok(self
                .structured
                .table_columns(required(call, "table_name")?)
                .await?),
            BuiltinTool::RunSqlQuery => Ok(self
                .structured
                .custom_query(required(call, "query")?)
                .await?),
            BuiltinTool::GetSampleRows => {
                let limit = call
                    .arguments
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map_or(DEFAULT_SAMPLE_ROWS, |n| n.min(u32::MAX as u64) as u32);
                Ok(self
                    .structured
                    .sample_rows(required(call, "table_name")?, limit)
                    .await?)
            }
        }
    }
}
