//! The closed set of retrieval tools and the catalog advertised to the model.
//!
//! Definitions are JSON files (`name`, `description`, `parameters`,
//! `tool_type`). The built-in set is embedded at compile time; a directory of
//! overrides can be loaded instead. A file is accepted only when it names a
//! known tool with its correct class, so every advertised tool has a handler.

use hybridrag_core::error::ToolError;
use hybridrag_core::provider::ToolDefinition;
use hybridrag_core::tool::ToolClass;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Every tool the dispatcher can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    GlobalSearch,
    LocalSearch,
    RunCypherQuery,
    GetAllTables,
    GetTableSchema,
    RunSqlQuery,
    GetSampleRows,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 7] = [
        BuiltinTool::GlobalSearch,
        BuiltinTool::LocalSearch,
        BuiltinTool::RunCypherQuery,
        BuiltinTool::GetAllTables,
        BuiltinTool::GetTableSchema,
        BuiltinTool::RunSqlQuery,
        BuiltinTool::GetSampleRows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::GlobalSearch => "global_search",
            BuiltinTool::LocalSearch => "local_search",
            BuiltinTool::RunCypherQuery => "run_cypher_query",
            BuiltinTool::GetAllTables => "get_all_tables",
            BuiltinTool::GetTableSchema => "get_table_schema",
            BuiltinTool::RunSqlQuery => "run_sql_query",
            BuiltinTool::GetSampleRows => "get_sample_rows",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn class(&self) -> ToolClass {
        match self {
            BuiltinTool::GlobalSearch | BuiltinTool::LocalSearch | BuiltinTool::RunCypherQuery => {
                ToolClass::Unstructured
            }
            BuiltinTool::GetAllTables
            | BuiltinTool::GetTableSchema
            | BuiltinTool::RunSqlQuery
            | BuiltinTool::GetSampleRows => ToolClass::Structured,
        }
    }

    fn embedded_definition(&self) -> &'static str {
        match self {
            BuiltinTool::GlobalSearch => include_str!("../definitions/global_search.json"),
            BuiltinTool::LocalSearch => include_str!("../definitions/local_search.json"),
            BuiltinTool::RunCypherQuery => include_str!("../definitions/run_cypher_query.json"),
            BuiltinTool::GetAllTables => include_str!("../definitions/get_all_tables.json"),
            BuiltinTool::GetTableSchema => include_str!("../definitions/get_table_schema.json"),
            BuiltinTool::RunSqlQuery => include_str!("../definitions/run_sql_query.json"),
            BuiltinTool::GetSampleRows => include_str!("../definitions/get_sample_rows.json"),
        }
    }
}

impl std::fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Deserialize)]
struct DefinitionFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_schema")]
    parameters: serde_json::Value,
    tool_type: ToolClass,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// One advertised tool.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub tool: BuiltinTool,
    pub definition: ToolDefinition,
}

impl CatalogEntry {
    pub fn class(&self) -> ToolClass {
        self.tool.class()
    }
}

/// The tools offered to the reasoning model. Read-only after loading.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
}

impl ToolCatalog {
    /// The embedded definitions for every built-in tool.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for tool in BuiltinTool::ALL {
            match parse_definition(tool.name(), tool.embedded_definition()) {
                Ok(entry) => catalog.insert(entry, tool.name()),
                Err(e) => warn!(tool = %tool, error = %e, "Skipping embedded tool definition"),
            }
        }
        catalog
    }

    /// Load every `*.json` definition in `dir`, in file name order.
    ///
    /// Files that fail to parse, name an unknown tool or declare the wrong
    /// class are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Self {
        let mut catalog = Self::default();

        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to read tool definitions directory");
                return catalog;
            }
        };

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        for path in paths {
            let source = path.display().to_string();
            let loaded = std::fs::read_to_string(&path)
                .map_err(|e| ToolError::LoadFailed {
                    source_name: source.clone(),
                    reason: e.to_string(),
                })
                .and_then(|text| parse_definition(&source, &text));

            match loaded {
                Ok(entry) => catalog.insert(entry, &source),
                Err(e) => warn!(path = %source, error = %e, "Skipping tool definition"),
            }
        }

        info!(dir = %dir.display(), tools = catalog.len(), "Loaded tool catalog");
        catalog
    }

    fn insert(&mut self, entry: CatalogEntry, source: &str) {
        if self.entries.iter().any(|e| e.tool == entry.tool) {
            warn!(tool = %entry.tool, path = %source, "Duplicate tool definition, keeping the first");
            return;
        }
        debug!(tool = %entry.tool, class = %entry.class(), "Registered tool");
        self.entries.push(entry);
    }

    /// Resolve a model-requested name to a tool in this catalog.
    pub fn lookup(&self, name: &str) -> Option<BuiltinTool> {
        self.entries
            .iter()
            .find(|e| e.definition.name == name)
            .map(|e| e.tool)
    }

    pub fn class_of(&self, name: &str) -> Option<ToolClass> {
        self.lookup(name).map(|t| t.class())
    }

    /// Definitions for the reasoning request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.definition.clone()).collect()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse and validate one definition file.
pub fn parse_definition(source_name: &str, text: &str) -> Result<CatalogEntry, ToolError> {
    let load_failed = |reason: String| ToolError::LoadFailed {
        source_name: source_name.to_string(),
        reason,
    };

    let file: DefinitionFile = serde_json::from_str(text).map_err(|e| load_failed(e.to_string()))?;

    let tool = BuiltinTool::from_name(&file.name)
        .ok_or_else(|| load_failed(format!("no handler for tool '{}'", file.name)))?;

    if tool.class() != file.tool_type {
        return Err(load_failed(format!(
            "tool '{}' is {}, not {}",
            file.name,
            tool.class(),
            file.tool_type
        )));
    }

    Ok(CatalogEntry {
        tool,
        definition: ToolDefinition {
            name: file.name,
            description: file.description,
            parameters: file.parameters,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn builtin_catalog_has_every_tool() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.len(), BuiltinTool::ALL.len());
        for tool in BuiltinTool::ALL {
            assert_eq!(catalog.lookup(tool.name()), Some(tool));
        }
        assert_eq!(catalog.class_of("global_search"), Some(ToolClass::Unstructured));
        assert_eq!(catalog.class_of("run_sql_query"), Some(ToolClass::Structured));
        assert_eq!(catalog.class_of("shell"), None);
    }

    #[test]
    fn builtin_definitions_declare_required_arguments() {
        let catalog = ToolCatalog::builtin();
        let defs = catalog.definitions();
        let global = defs.iter().find(|d| d.name == "global_search").unwrap();
        assert_eq!(global.parameters["required"], serde_json::json!(["query", "response_type"]));
        let schema = defs.iter().find(|d| d.name == "get_table_schema").unwrap();
        assert_eq!(schema.parameters["required"], serde_json::json!(["table_name"]));
    }

    #[test]
    fn unknown_tool_name_rejected() {
        let err = parse_definition(
            "shell.json",
            r#"{"name": "shell", "description": "x", "tool_type": "structured"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::LoadFailed { .. }));
        assert!(err.to_string().contains("no handler"));
    }

    #[test]
    fn class_mismatch_rejected() {
        let err = parse_definition(
            "global.json",
            r#"{"name": "global_search", "description": "x", "tool_type": "structured"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unstructured"));
    }

    #[test]
    fn load_dir_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a_tables.json"),
            r#"{"name": "get_all_tables", "description": "List tables", "tool_type": "structured"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("b_broken.json"), "{ not json").unwrap();
        fs::write(
            dir.path().join("c_unknown.json"),
            r#"{"name": "send_email", "tool_type": "structured"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("d_local.json"),
            r#"{"name": "local_search", "description": "Chunks", "tool_type": "unstructured",
                "parameters": {"type": "object", "properties": {"query": {"type": "string"}}}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = ToolCatalog::load_dir(dir.path());
        let names: Vec<_> = catalog.entries().iter().map(|e| e.definition.name.as_str()).collect();
        assert_eq!(names, vec!["get_all_tables", "local_search"]);
        assert_eq!(
            catalog.definitions()[0].parameters,
            serde_json::json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn load_dir_keeps_first_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("1.json"),
            r#"{"name": "run_sql_query", "description": "first", "tool_type": "structured"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("2.json"),
            r#"{"name": "run_sql_query", "description": "second", "tool_type": "structured"}"#,
        )
        .unwrap();
        let catalog = ToolCatalog::load_dir(dir.path());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.definitions()[0].description, "first");
    }

    #[test]
    fn missing_dir_yields_empty_catalog() {
        let catalog = ToolCatalog::load_dir(Path::new("/nonexistent/hybridrag/tools"));
        assert!(catalog.is_empty());
    }
}
