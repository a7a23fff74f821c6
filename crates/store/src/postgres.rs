//! PostgreSQL relational backend.
//!
//! Implements [`RelationalStore`] with:
//! - Catalog introspection through `information_schema` (public schema only)
//! - Reads wrapped in `json_agg` inside a `READ ONLY` transaction, so each
//!   read returns JSON-safe rows and cannot mutate
//! - Writes in a committed transaction returning the affected row count

use async_trait::async_trait;
use hybridrag_config::RelationalConfig;
use hybridrag_core::error::StoreError;
use hybridrag_core::store::{ColumnInfo, HealthReport, JsonRow, QueryOutcome, RelationalStore};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::{Query, QueryScalar};
use sqlx::Postgres;
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKEND: &str = "postgres";

// Only statements that are valid as a subquery; `SHOW` and `EXPLAIN` are not.
const READ_KEYWORDS: &[&str] = &["select", "with", "values", "table"];

/// PostgreSQL store sharing one connection pool.
pub struct PgRelationalStore {
    pool: PgPool,
}

impl PgRelationalStore {
    /// Connect eagerly using the pool bounds from configuration.
    pub async fn connect(config: &RelationalConfig) -> Result<Self, StoreError> {
        let url = config.connection_url().ok_or_else(|| {
            StoreError::unavailable(BACKEND, "POSTGRES_HOST, POSTGRES_DATABASE and POSTGRES_USER are required")
        })?;

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&url)
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, format!("connection failed: {e}")))?;

        info!(
            min = config.min_connections,
            max = config.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Create from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn read_json(&self, statement: &str, params: &[serde_json::Value]) -> Result<Vec<JsonRow>, StoreError> {
        let wrapped = wrap_read(statement);
        debug!(sql = %wrapped, "Running read");

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let mut query: QueryScalar<'_, Postgres, String, PgArguments> = sqlx::query_scalar(&wrapped);
        for param in params {
            query = bind_scalar(query, param);
        }
        let text = query.fetch_one(&mut *tx).await.map_err(map_sqlx)?;
        tx.rollback().await.map_err(map_sqlx)?;

        serde_json::from_str::<Vec<JsonRow>>(&text).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn write(&self, statement: &str, params: &[serde_json::Value]) -> Result<u64, StoreError> {
        debug!(sql = %statement, "Running write");

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut query: Query<'_, Postgres, PgArguments> = sqlx::query(statement);
        for param in params {
            query = bind_query(query, param);
        }
        let result = query.execute(&mut *tx).await.map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

/// Whether a statement is a read, judged by its leading keyword.
pub fn is_read_statement(statement: &str) -> bool {
    let first = statement
        .trim_start()
        .trim_start_matches('(')
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    READ_KEYWORDS.contains(&first.as_str())
}

fn wrap_read(statement: &str) -> String {
    let inner = statement.trim().trim_end_matches(';');
    format!("SELECT COALESCE(json_agg(t), '[]'::json)::text FROM ({inner}) t")
}

/// Double-quote a table name after checking it is a plain identifier.
fn quote_identifier(name: &str) -> Result<String, StoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(format!("\"{name}\""))
    } else {
        Err(StoreError::QueryFailed(format!("invalid table name: {name}")))
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::unavailable(BACKEND, err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode(err.to_string()),
        other => StoreError::QueryFailed(other.to_string()),
    }
}

macro_rules! bind_json {
    ($query:expr, $value:expr) => {
        match $value {
            serde_json::Value::Null => $query.bind(None::<String>),
            serde_json::Value::Bool(b) => $query.bind(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => $query.bind(i),
                None => $query.bind(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => $query.bind(s.clone()),
            other => $query.bind(other.to_string()),
        }
    };
}

fn bind_scalar<'q>(
    query: QueryScalar<'q, Postgres, String, PgArguments>,
    value: &serde_json::Value,
) -> QueryScalar<'q, Postgres, String, PgArguments> {
    bind_json!(query, value)
}

fn bind_query<'q>(query: Query<'q, Postgres, PgArguments>, value: &serde_json::Value) -> Query<'q, Postgres, PgArguments> {
    bind_json!(query, value)
}

#[async_trait]
impl RelationalStore for PgRelationalStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT column_name::text, data_type::text, is_nullable::text \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(column_name, data_type, is_nullable)| ColumnInfo {
                column_name,
                data_type,
                is_nullable,
            })
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: u32) -> Result<Vec<JsonRow>, StoreError> {
        let statement = format!("SELECT * FROM {} LIMIT $1", quote_identifier(table)?);
        self.read_json(&statement, &[serde_json::json!(limit)]).await
    }

    async fn execute(&self, statement: &str, params: &[serde_json::Value]) -> Result<QueryOutcome, StoreError> {
        if is_read_statement(statement) {
            self.read_json(statement, params).await.map(QueryOutcome::Rows)
        } else {
            self.write(statement, params).await.map(QueryOutcome::Affected)
        }
    }

    async fn health_check(&self) -> HealthReport {
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => HealthReport::ok(BACKEND, format!("pool size {}", self.pool.size())),
            Err(e) => {
                warn!(error = %e, "Relational store health check failed");
                HealthReport::down(BACKEND, e.to_string())
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}
