//! Schema discovery and SQL access over the relational store.

use hybridrag_core::error::StoreError;
use hybridrag_core::store::RelationalStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SAMPLE_ROWS: u32 = 5;
pub const MAX_SAMPLE_ROWS: u32 = 50;

/// Relational lookups returned as JSON values.
#[derive(Clone)]
pub struct StructuredService {
    store: Arc<dyn RelationalStore>,
}

impl StructuredService {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// Table names as a JSON array of strings.
    pub async fn list_tables(&self) -> Result<Value, StoreError> {
        let tables = self.store.list_tables().await?;
        debug!(tables = tables.len(), "Listed tables");
        Ok(Value::Array(tables.into_iter().map(Value::String).collect()))
    }

    /// `[{column_name, data_type, is_nullable}]` for `table`.
    pub async fn table_columns(&self, table: &str) -> Result<Value, StoreError> {
        let columns = self.store.table_columns(table).await?;
        serde_json::to_value(columns).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Up to `limit` rows, clamped to [`MAX_SAMPLE_ROWS`].
    pub async fn sample_rows(&self, table: &str, limit: u32) -> Result<Value, StoreError> {
        let limit = limit.clamp(1, MAX_SAMPLE_ROWS);
        let rows = self.store.sample_rows(table, limit).await?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }

    /// Run a model-authored statement. Reads return rows; writes return
    /// `{"affected_rows": n}`.
    pub async fn custom_query(&self, statement: &str) -> Result<Value, StoreError> {
        let outcome = self.store.execute(statement, &[]).await?;
        Ok(outcome.into_json())
    }
}
