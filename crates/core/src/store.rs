//! Store traits: the graph and relational backends behind every tool.
//!
//! Implementations live in `hybridrag-store`. Both traits are object safe and
//! shared as `Arc<dyn ... >` for the lifetime of the process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::record::{Chunk, CommunityReport};
use crate::scope::ScopeKey;

/// One result row as a JSON object keyed by column name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// Outcome of running an arbitrary statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// A read returned these rows
    Rows(Vec<JsonRow>),
    /// A write touched this many rows
    Affected(u64),
}

impl QueryOutcome {
    pub fn into_json(self) -> serde_json::Value {
        match self {
            QueryOutcome::Rows(rows) => serde_json::Value::Array(
                rows.into_iter().map(serde_json::Value::Object).collect(),
            ),
            QueryOutcome::Affected(n) => serde_json::json!({ "affected_rows": n }),
        }
    }
}

/// Column metadata from the relational catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: String,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub backend: String,
    pub connected: bool,
    pub detail: String,
}

impl HealthReport {
    pub fn ok(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { backend: backend.into(), connected: true, detail: detail.into() }
    }

    pub fn down(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { backend: backend.into(), connected: false, detail: detail.into() }
    }
}

/// Property-graph backend holding documents, chunks, entities and communities.
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn name(&self) -> &str;

    /// All community reports visible to `scope`.
    async fn community_reports(&self, scope: &ScopeKey) -> Result<Vec<CommunityReport>, StoreError>;

    /// All chunks visible to `scope`, optionally limited to one document type.
    async fn chunks(
        &self,
        scope: &ScopeKey,
        document_type: Option<&str>,
    ) -> Result<Vec<Chunk>, StoreError>;

    /// Run a raw pattern query with named parameters.
    async fn run_query(
        &self,
        statement: &str,
        params: serde_json::Value,
    ) -> Result<Vec<JsonRow>, StoreError>;

    /// Create constraints and indexes. Individual statement failures are tolerated.
    async fn initialize_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn health_check(&self) -> HealthReport;
}

/// Relational backend holding structured tables.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StoreError>;

    async fn sample_rows(&self, table: &str, limit: u32) -> Result<Vec<JsonRow>, StoreError>;

    /// Reads return rows and never mutate; writes commit and return the affected count.
    async fn execute(
        &self,
        statement: &str,
        params: &[serde_json::Value],
    ) -> Result<QueryOutcome, StoreError>;

    async fn health_check(&self) -> HealthReport;

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affected_outcome_to_json() {
        let value = QueryOutcome::Affected(3).into_json();
        assert_eq!(value["affected_rows"], 3);
    }

    #[test]
    fn rows_outcome_to_json_array() {
        let mut row = JsonRow::new();
        row.insert("n".into(), serde_json::json!(1));
        let value = QueryOutcome::Rows(vec![row]).into_json();
        assert_eq!(value, serde_json::json!([{"n": 1}]));
    }

    #[test]
    fn health_report_constructors() {
        assert!(HealthReport::ok("neo4j", "reachable").connected);
        assert!(!HealthReport::down("postgres", "refused").connected);
    }
}
