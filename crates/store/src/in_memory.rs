//! In-memory stores, useful for testing and demos.

use async_trait::async_trait;
use hybridrag_core::error::StoreError;
use hybridrag_core::record::{Chunk, CommunityReport};
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::store::{
    ColumnInfo, GraphStore, HealthReport, JsonRow, QueryOutcome, RelationalStore,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::postgres::is_read_statement;

#[derive(Default)]
struct ScopedGraph {
    reports: Vec<CommunityReport>,
    chunks: Vec<(Chunk, Option<String>)>,
}

/// A graph store holding records per scope key.
#[derive(Default)]
pub struct InMemoryGraphStore {
    scopes: RwLock<HashMap<String, ScopedGraph>>,
    query_rows: RwLock<Vec<JsonRow>>,
    last_query: RwLock<Option<(String, serde_json::Value)>>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_report(&self, scope: &ScopeKey, report: CommunityReport) {
        let mut scopes = self.scopes.write().await;
        scopes.entry(scope.to_string()).or_default().reports.push(report);
    }

    /// Add a chunk belonging to a document of `document_type`.
    pub async fn add_chunk(&self, scope: &ScopeKey, chunk: Chunk, document_type: Option<&str>) {
        let mut scopes = self.scopes.write().await;
        scopes
            .entry(scope.to_string())
            .or_default()
            .chunks
            .push((chunk, document_type.map(String::from)));
    }

    /// Rows returned by every raw `run_query` call.
    pub async fn set_query_rows(&self, rows: Vec<JsonRow>) {
        *self.query_rows.write().await = rows;
    }

    /// The most recent raw statement and its parameters.
    pub async fn last_query(&self) -> Option<(String, serde_json::Value)> {
        self.last_query.read().await.clone()
    }

    /// Number of store calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("in_memory_graph", "store marked unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn name(&self) -> &str {
        "in_memory_graph"
    }

    async fn community_reports(&self, scope: &ScopeKey) -> Result<Vec<CommunityReport>, StoreError> {
        self.begin()?;
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope.as_str())
            .map(|g| g.reports.clone())
            .unwrap_or_default())
    }

    async fn chunks(&self, scope: &ScopeKey, document_type: Option<&str>) -> Result<Vec<Chunk>, StoreError> {
        self.begin()?;
        let scopes = self.scopes.read().await;
        Ok(scopes
            .get(scope.as_str())
            .map(|g| {
                g.chunks
                    .iter()
                    .filter(|(_, ty)| document_type.is_none() || ty.as_deref() == document_type)
                    .map(|(c, _)| c.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn run_query(&self, statement: &str, params: serde_json::Value) -> Result<Vec<JsonRow>, StoreError> {
        self.begin()?;
        *self.last_query.write().await = Some((statement.to_string(), params));
        Ok(self.query_rows.read().await.clone())
    }

    async fn health_check(&self) -> HealthReport {
        if self.unavailable.load(Ordering::SeqCst) {
            HealthReport::down(self.name(), "store marked unavailable")
        } else {
            HealthReport::ok(self.name(), "in memory")
        }
    }
}

struct Table {
    columns: Vec<ColumnInfo>,
    rows: Vec<JsonRow>,
}

/// A relational store holding whole tables in memory.
///
/// Reads return every row of the first table named after `FROM`; writes
/// are recorded and report zero affected rows.
#[derive(Default)]
pub struct InMemoryRelationalStore {
    tables: RwLock<BTreeMap<String, Table>>,
    writes: RwLock<Vec<String>>,
    unavailable: AtomicBool,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Column types are inferred from the first row.
    pub async fn add_table(&self, name: &str, rows: Vec<JsonRow>) {
        let columns = rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| ColumnInfo {
                        column_name: column.clone(),
                        data_type: json_type_name(value).into(),
                        is_nullable: "YES".into(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.tables
            .write()
            .await
            .insert(name.to_string(), Table { columns, rows });
    }

    pub async fn writes(&self) -> Vec<String> {
        self.writes.read().await.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("in_memory_relational", "store marked unavailable"))
        } else {
            Ok(())
        }
    }

    async fn rows_of(&self, table: &str) -> Result<Vec<JsonRow>, StoreError> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| StoreError::QueryFailed(format!("relation \"{table}\" does not exist")))
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "unknown",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_i64() => "integer",
        serde_json::Value::Number(_) => "numeric",
        serde_json::Value::String(_) => "text",
        _ => "jsonb",
    }
}

fn table_after_from(statement: &str) -> Option<String> {
    let mut words = statement.split_whitespace();
    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("from") {
            return words
                .next()
                .map(|t| t.trim_matches(|c: char| c == '"' || c == ';').to_string());
        }
    }
    None
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    fn name(&self) -> &str {
        "in_memory_relational"
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.tables.read().await.keys().cloned().collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn sample_rows(&self, table: &str, limit: u32) -> Result<Vec<JsonRow>, StoreError> {
        self.check()?;
        let mut rows = self.rows_of(table).await?;
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn execute(&self, statement: &str, _params: &[serde_json::Value]) -> Result<QueryOutcome, StoreError> {
        self.check()?;
        if is_read_statement(statement) {
            let table = table_after_from(statement)
                .ok_or_else(|| StoreError::QueryFailed("no FROM clause".into()))?;
            self.rows_of(&table).await.map(QueryOutcome::Rows)
        } else {
            self.writes.write().await.push(statement.to_string());
            Ok(QueryOutcome::Affected(0))
        }
    }

    async fn health_check(&self) -> HealthReport {
        match self.check() {
            Ok(()) => HealthReport::ok(self.name(), "in memory"),
            Err(e) => HealthReport::down(self.name(), e.to_string()),
        }
    }
}
