//! Neo4j graph backend over the HTTP transactional endpoint.
//!
//! Every statement is sent as a single auto-commit transaction to
//! `POST {uri}/db/{database}/tx/commit` with basic auth. Scoped reads match
//! every node pattern on `userEmail` so one caller never sees another's graph.

use async_trait::async_trait;
use hybridrag_config::GraphConfig;
use hybridrag_core::error::StoreError;
use hybridrag_core::record::{Chunk, CommunityReport};
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::store::{GraphStore, HealthReport, JsonRow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKEND: &str = "neo4j";

const COMMUNITY_REPORTS: &str = "\
MATCH (c:__Community__ {userEmail: $user_email})
OPTIONAL MATCH (c)-[:HAS_FINDING]->(finding:Finding)
OPTIONAL MATCH (e:__Entity__ {userEmail: $user_email})-[:IN_COMMUNITY]->(c)
OPTIONAL MATCH (chunk:__Chunk__ {userEmail: $user_email})-[:HAS_ENTITY]->(e)
WITH c, finding,
    collect(DISTINCT e.name) AS entity_names,
    collect(DISTINCT e.description) AS entity_descriptions,
    collect(DISTINCT chunk.text) AS chunk_texts,
    collect(DISTINCT e.title) AS entity_titles
RETURN {
    id: c.community,
    title: COALESCE(finding.summary, c.title),
    summary: COALESCE(finding.summary, c.title, ''),
    full_content: COALESCE(finding.full_content, finding.summary, c.title, ''),
    entity_names: entity_names,
    entity_descriptions: entity_descriptions,
    chunk_texts: chunk_texts,
    entity_titles: entity_titles,
    finding_id: COALESCE(finding.id, ''),
    level: COALESCE(c.level, 0),
    rank: COALESCE(finding.rank, 0)
} AS report
ORDER BY c.community";

const DOCUMENT_ANY: &str =
    "OPTIONAL MATCH (chunk)-[:PART_OF]->(doc:__Document__ {userEmail: $user_email})";
const DOCUMENT_TYPED: &str =
    "MATCH (chunk)-[:PART_OF]->(doc:__Document__ {userEmail: $user_email}) WHERE doc.type = $document_type";

fn chunks_statement(filter_by_type: bool) -> String {
    let document_clause = if filter_by_type { DOCUMENT_TYPED } else { DOCUMENT_ANY };
    format!(
        "\
MATCH (chunk:__Chunk__ {{userEmail: $user_email}})
OPTIONAL MATCH (chunk)-[:HAS_ENTITY]->(entity:__Entity__ {{userEmail: $user_email}})
{document_clause}
WITH chunk,
    collect(DISTINCT entity.name) AS entity_names,
    collect(DISTINCT entity.description) AS entity_descriptions,
    collect(DISTINCT entity.type) AS entity_types,
    collect(DISTINCT doc.title) AS document_titles
RETURN {{
    id: chunk.id,
    text: chunk.text,
    n_tokens: chunk.n_tokens,
    entity_names: entity_names,
    entity_descriptions: entity_descriptions,
    entity_types: entity_types,
    document_titles: document_titles,
    embedding: chunk.embedding,
    relevance_score: 0
}} AS chunk_data
ORDER BY chunk.id"
    )
}

/// Constraints and indexes created by [`GraphStore::initialize_schema`].
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT document_id_unique IF NOT EXISTS FOR (d:__Document__) REQUIRE d.id IS UNIQUE",
    "CREATE CONSTRAINT chunk_id_unique IF NOT EXISTS FOR (c:__Chunk__) REQUIRE c.id IS UNIQUE",
    "CREATE CONSTRAINT entity_id_unique IF NOT EXISTS FOR (e:__Entity__) REQUIRE e.id IS UNIQUE",
    "CREATE CONSTRAINT community_id_unique IF NOT EXISTS FOR (c:__Community__) REQUIRE c.community IS UNIQUE",
    "CREATE INDEX document_title_index IF NOT EXISTS FOR (d:__Document__) ON (d.title)",
    "CREATE INDEX entity_name_index IF NOT EXISTS FOR (e:__Entity__) ON (e.name)",
    "CREATE INDEX entity_type_index IF NOT EXISTS FOR (e:__Entity__) ON (e.type)",
    "CREATE INDEX relationship_id_index IF NOT EXISTS FOR ()-[r:RELATED]-() ON (r.id)",
    "CREATE INDEX document_user_email_index IF NOT EXISTS FOR (d:__Document__) ON (d.userEmail)",
    "CREATE INDEX chunk_user_email_index IF NOT EXISTS FOR (c:__Chunk__) ON (c.userEmail)",
    "CREATE INDEX entity_user_email_index IF NOT EXISTS FOR (e:__Entity__) ON (e.userEmail)",
    "CREATE INDEX community_user_email_index IF NOT EXISTS FOR (c:__Community__) ON (c.userEmail)",
    "CREATE INDEX relationship_user_email_index IF NOT EXISTS FOR ()-[r:RELATED]-() ON (r.userEmail)",
];

/// Graph store backed by a Neo4j server.
pub struct Neo4jHttpStore {
    endpoint: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl Neo4jHttpStore {
    pub fn new(
        uri: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        database: &str,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::unavailable(BACKEND, format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: format!("{}/db/{database}/tx/commit", uri.trim_end_matches('/')),
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    pub fn from_config(config: &GraphConfig) -> Result<Self, StoreError> {
        let uri = config
            .uri
            .as_deref()
            .ok_or_else(|| StoreError::unavailable(BACKEND, "NEO4J_URI is not set"))?;
        Self::new(
            uri,
            config.username.clone().unwrap_or_default(),
            config.password.clone().unwrap_or_default(),
            &config.database,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn commit(&self, statement: &str, parameters: serde_json::Value) -> Result<Vec<JsonRow>, StoreError> {
        let body = TxRequest {
            statements: vec![TxStatement {
                statement,
                parameters,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::unavailable(BACKEND, e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(StoreError::unavailable(BACKEND, "authentication rejected"));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::QueryFailed(format!("HTTP {status}: {text}")));
        }

        let parsed: TxResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        rows_from_response(parsed)
    }

    /// Run a scoped read and pull one map-valued column out of every row.
    async fn scoped_column<T>(
        &self,
        statement: &str,
        parameters: serde_json::Value,
        column: &str,
    ) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let rows = self.commit(statement, parameters).await?;
        rows.into_iter()
            .filter_map(|mut row| row.remove(column))
            .map(|value| serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string())))
            .collect()
    }
}

/// Flatten a transactional response into rows keyed by column name.
fn rows_from_response(response: TxResponse) -> Result<Vec<JsonRow>, StoreError> {
    if let Some(error) = response.errors.into_iter().next() {
        return Err(StoreError::QueryFailed(format!("{}: {}", error.code, error.message)));
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    Ok(result
        .data
        .into_iter()
        .map(|datum| {
            result
                .columns
                .iter()
                .cloned()
                .zip(datum.row)
                .collect::<JsonRow>()
        })
        .collect())
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn community_reports(&self, scope: &ScopeKey) -> Result<Vec<CommunityReport>, StoreError> {
        let reports: Vec<CommunityReport> = self
            .scoped_column(
                COMMUNITY_REPORTS,
                serde_json::json!({ "user_email": scope.as_str() }),
                "report",
            )
            .await?;
        debug!(scope = %scope, records = reports.len(), "Fetched community reports");
        Ok(reports)
    }

    async fn chunks(&self, scope: &ScopeKey, document_type: Option<&str>) -> Result<Vec<Chunk>, StoreError> {
        let statement = chunks_statement(document_type.is_some());
        let chunks: Vec<Chunk> = self
            .scoped_column(
                &statement,
                serde_json::json!({
                    "user_email": scope.as_str(),
                    "document_type": document_type,
                }),
                "chunk_data",
            )
            .await?;
        debug!(scope = %scope, records = chunks.len(), ?document_type, "Fetched chunks");
        Ok(chunks)
    }

    async fn run_query(&self, statement: &str, params: serde_json::Value) -> Result<Vec<JsonRow>, StoreError> {
        self.commit(statement, params).await
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        let mut applied = 0usize;
        for statement in SCHEMA_STATEMENTS {
            match self.commit(statement, serde_json::json!({})).await {
                Ok(_) => applied += 1,
                // Some editions reject relationship indexes; keep going.
                Err(StoreError::BackendUnavailable { backend, reason }) => {
                    return Err(StoreError::SchemaInit(format!("{backend}: {reason}")));
                }
                Err(e) => debug!(statement, error = %e, "Schema statement skipped"),
            }
        }
        info!(applied, total = SCHEMA_STATEMENTS.len(), "Graph schema initialized");
        Ok(())
    }

    async fn health_check(&self) -> HealthReport {
        match self.commit("RETURN 1 AS ok", serde_json::json!({})).await {
            Ok(_) => HealthReport::ok(BACKEND, self.endpoint.clone()),
            Err(e) => {
                warn!(error = %e, "Graph store health check failed");
                HealthReport::down(BACKEND, e.to_string())
            }
        }
    }
}

// --- Transactional API types (internal) ---

#[derive(Debug, Serialize)]
struct TxRequest<'a> {
    statements: Vec<TxStatement<'a>>,
}

#[derive(Debug, Serialize)]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxDatum>,
}

#[derive(Debug, Deserialize)]
struct TxDatum {
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}
