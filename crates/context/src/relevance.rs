//! Relevance scoring for retrieved records.
//!
//! Community reports are filtered lexically against the query; chunks are
//! ranked by cosine similarity between the query embedding and their stored
//! embedding.

use hybridrag_core::error::ContextError;
use hybridrag_core::provider::{EmbeddingRequest, Provider};
use hybridrag_core::record::{Chunk, CommunityReport};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Query terms used for lexical matching: lowercased, whitespace split,
/// deduplicated, longer than two characters.
pub fn query_terms(query: &str) -> BTreeSet<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|term| term.chars().count() > 2)
        .map(String::from)
        .collect()
}

fn searchable_text(report: &CommunityReport) -> String {
    format!(
        "{} {} {}",
        report.title,
        report.summary,
        report.entity_names.join(" ")
    )
    .to_lowercase()
}

/// Keep the reports mentioning any query term, or all of them when none do.
///
/// Each report's `relevance` is set to the fraction of terms it matched.
pub fn filter_by_query_terms(query: &str, mut reports: Vec<CommunityReport>) -> Vec<CommunityReport> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return reports;
    }

    for report in &mut reports {
        let text = searchable_text(report);
        let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
        report.relevance = matched as f64 / terms.len() as f64;
    }

    if reports.iter().any(|r| r.relevance > 0.0) {
        let total = reports.len();
        reports.retain(|r| r.relevance > 0.0);
        debug!(kept = reports.len(), total, "Lexical filter matched reports");
    } else {
        debug!(total = reports.len(), "No lexical match, keeping every report");
    }
    reports
}

/// Drop reports ranked below `min_rank`. A non-positive minimum keeps all.
pub fn filter_by_min_rank(reports: Vec<CommunityReport>, min_rank: f64) -> Vec<CommunityReport> {
    if min_rank <= 0.0 {
        return reports;
    }
    reports.into_iter().filter(|r| r.rank >= min_rank).collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is empty, the lengths differ, or a norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    dot / denom
}

/// Score chunks against a query vector, sort descending and drop those
/// below `min_score`.
pub fn rank_chunks(query_embedding: &[f32], mut chunks: Vec<Chunk>, min_score: f64) -> Vec<Chunk> {
    for chunk in &mut chunks {
        chunk.relevance_score = cosine_similarity(query_embedding, &chunk.embedding);
    }
    chunks.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    chunks.retain(|c| c.relevance_score >= min_score);
    chunks
}

/// Embedding-similarity scorer for chunks.
#[derive(Clone)]
pub struct EmbeddingScorer {
    provider: Option<Arc<dyn Provider>>,
    model: String,
}

impl EmbeddingScorer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            model: model.into(),
        }
    }

    /// A scorer with no embedding capability; scoring reports `ScoringUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            provider: None,
            model: String::new(),
        }
    }

    /// Fails when no embedding capability is configured.
    pub fn ensure_available(&self) -> Result<(), ContextError> {
        match self.provider {
            Some(_) => Ok(()),
            None => Err(ContextError::ScoringUnavailable(
                "no embedding provider configured".into(),
            )),
        }
    }

    /// Embed the query and rank `chunks` by similarity.
    ///
    /// A failed embedding request is logged and leaves every score at zero.
    pub async fn score(&self, query: &str, chunks: Vec<Chunk>, min_score: f64) -> Result<Vec<Chunk>, ContextError> {
        let Some(provider) = &self.provider else {
            return Err(ContextError::ScoringUnavailable(
                "no embedding provider configured".into(),
            ));
        };
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let request = EmbeddingRequest {
            model: self.model.clone(),
            inputs: vec![query.to_string()],
        };
        let query_embedding = match provider.embed(request).await {
            Ok(response) => response.embeddings.into_iter().next().unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, chunks = chunks.len(), "Query embedding failed, chunks left unscored");
                Vec::new()
            }
        };

        Ok(rank_chunks(&query_embedding, chunks, min_score))
    }
}
