//! Context builders for global (community report) and local (chunk) search.
//!
//! Both run the same pipeline: optional conversation prefix, scoped
//! retrieval, relevance scoring, packing, then prefixing every batch.

use async_trait::async_trait;
use hybridrag_core::error::ContextError;
use hybridrag_core::record::{Chunk, CommunityReport};
use hybridrag_core::scope::ScopeKey;
use hybridrag_core::search::{ConversationHistoryOptions, GlobalContextOptions, LocalContextOptions};
use hybridrag_core::store::GraphStore;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::conversation::ConversationHistory;
use crate::packer::{BatchPacker, ContextTable, PackedContext};
use crate::relevance::{EmbeddingScorer, filter_by_min_rank, filter_by_query_terms};
use crate::token::{HeuristicCounter, TokenCounter};
use crate::weight::assign_weights;

/// Output of a context build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextResult {
    /// One rendered text per batch.
    pub context_chunks: Vec<String>,
    /// Tabular records keyed by lowercased batch name.
    pub context_records: BTreeMap<String, ContextTable>,
    pub llm_calls: usize,
    pub prompt_tokens: usize,
    pub output_tokens: usize,
}

impl ContextResult {
    pub fn is_empty(&self) -> bool {
        self.context_chunks.is_empty()
    }
}

/// Builds a token-budgeted context for one query.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    type Options: Send + Sync;

    /// Build the context visible to `scope`. `None` fails with
    /// `MissingScopeKey` before any store call.
    async fn build_context(
        &self,
        query: &str,
        history: Option<&ConversationHistory>,
        options: &Self::Options,
        scope: Option<&ScopeKey>,
    ) -> Result<ContextResult, ContextError>;
}

fn require_scope(scope: Option<&ScopeKey>) -> Result<&ScopeKey, ContextError> {
    scope.ok_or(ContextError::MissingScopeKey)
}

struct Prefix {
    text: String,
    tokens: usize,
    table: Option<(String, ContextTable)>,
}

fn conversation_prefix(
    history: Option<&ConversationHistory>,
    options: &ConversationHistoryOptions,
    delimiter: &str,
    max_tokens: usize,
    counter: &dyn TokenCounter,
) -> Prefix {
    let Some(history) = history.filter(|h| !h.is_empty()) else {
        return Prefix { text: String::new(), tokens: 0, table: None };
    };

    let (text, table) = history.build_context(options, delimiter, max_tokens, counter);
    if text.is_empty() {
        return Prefix { text, tokens: 0, table: None };
    }

    let text = format!("{}\n\n", text.trim_end());
    let tokens = counter.count(&text);
    Prefix {
        text,
        tokens,
        table: Some((options.context_name.to_lowercase(), table)),
    }
}

fn assemble(prefix: Prefix, packed: PackedContext, name: &str) -> ContextResult {
    let mut result = ContextResult::default();

    if let Some((key, table)) = prefix.table {
        result.context_records.insert(key, table);
    }

    if packed.is_empty() {
        if !prefix.text.is_empty() {
            result.context_chunks.push(prefix.text.trim_end().to_string());
        }
        return result;
    }

    result.context_chunks = packed
        .batches
        .into_iter()
        .map(|batch| format!("{}{batch}", prefix.text))
        .collect();
    result.context_records.insert(name.to_lowercase(), packed.table);
    result
}

fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Community report context for global search.
pub struct GlobalContextBuilder {
    store: Arc<dyn GraphStore>,
    counter: Arc<dyn TokenCounter>,
}

impl GlobalContextBuilder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            counter: Arc::new(HeuristicCounter),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    fn header(options: &GlobalContextOptions) -> Vec<String> {
        let mut header = vec!["id".to_string(), "title".to_string()];
        if options.include_community_weight {
            header.push(options.community_weight_name.clone());
        }
        header.push(if options.use_community_summary { "summary" } else { "content" }.into());
        if options.include_community_rank {
            header.push(options.community_rank_name.clone());
        }
        header
    }

    fn row(report: &CommunityReport, options: &GlobalContextOptions) -> Vec<String> {
        let mut row = vec![report.id.clone(), report.title.clone()];
        if options.include_community_weight {
            row.push(fmt_number(report.weight));
        }
        row.push(if options.use_community_summary {
            report.summary.clone()
        } else {
            report.full_content.clone()
        });
        if options.include_community_rank {
            row.push(fmt_number(report.rank));
        }
        row
    }
}

#[async_trait]
impl ContextBuilder for GlobalContextBuilder {
    type Options = GlobalContextOptions;

    async fn build_context(
        &self,
        query: &str,
        history: Option<&ConversationHistory>,
        options: &GlobalContextOptions,
        scope: Option<&ScopeKey>,
    ) -> Result<ContextResult, ContextError> {
        let scope = require_scope(scope)?;

        let prefix = conversation_prefix(
            history,
            &options.conversation,
            &options.column_delimiter,
            options.max_context_tokens,
            self.counter.as_ref(),
        );

        let reports = self.store.community_reports(scope).await?;
        let fetched = reports.len();
        let mut reports = filter_by_query_terms(query, reports);
        if options.include_community_rank {
            reports = filter_by_min_rank(reports, options.min_community_rank);
        }
        if options.include_community_weight {
            assign_weights(&mut reports, options.normalize_community_weight);
        }

        let packer = BatchPacker::new(
            options.context_name.clone(),
            options.max_context_tokens.saturating_sub(prefix.tokens),
        )
        .with_delimiter(options.column_delimiter.clone())
        .with_single_batch(options.single_batch)
        .with_shuffle(options.shuffle_data.then_some(options.random_state))
        .with_sort_columns(options.include_community_weight, options.include_community_rank)
        .with_counter(self.counter.clone());

        let packed = packer.pack(reports, &Self::header(options), |r| Self::row(r, options));

        info!(
            scope = %scope,
            records = fetched,
            packed = packed.table.len(),
            batches = packed.batches.len(),
            "Built global context"
        );
        Ok(assemble(prefix, packed, &options.context_name))
    }
}

/// Text chunk context for local search.
pub struct LocalContextBuilder {
    store: Arc<dyn GraphStore>,
    scorer: EmbeddingScorer,
    counter: Arc<dyn TokenCounter>,
}

const CHUNK_HEADER: [&str; 7] = [
    "id",
    "text",
    "entity_names",
    "entity_descriptions",
    "entity_types",
    "document_titles",
    "relevance_score",
];

impl LocalContextBuilder {
    pub fn new(store: Arc<dyn GraphStore>, scorer: EmbeddingScorer) -> Self {
        Self {
            store,
            scorer,
            counter: Arc::new(HeuristicCounter),
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    fn row(chunk: &Chunk) -> Vec<String> {
        vec![
            chunk.id.clone(),
            chunk.text.clone(),
            chunk.entity_names.join(", "),
            chunk.entity_descriptions.join(", "),
            chunk.entity_types.join(", "),
            chunk.document_titles.join(", "),
            format!("{:.4}", chunk.relevance_score),
        ]
    }

    /// Fetch the scoped chunks and rank them against `query`.
    async fn scored_chunks(
        &self,
        query: &str,
        document_type: Option<&str>,
        min_relevance: f64,
        scope: Option<&ScopeKey>,
    ) -> Result<Vec<Chunk>, ContextError> {
        let scope = require_scope(scope)?;
        self.scorer.ensure_available()?;

        let chunks = self.store.chunks(scope, document_type).await?;
        let fetched = chunks.len();
        let ranked = self.scorer.score(query, chunks, min_relevance).await?;
        debug!(scope = %scope, records = fetched, relevant = ranked.len(), "Scored chunks");
        Ok(ranked)
    }

    /// Like [`ContextBuilder::build_context`], restricted to one document type.
    pub async fn build_context_for_type(
        &self,
        query: &str,
        history: Option<&ConversationHistory>,
        options: &LocalContextOptions,
        document_type: Option<&str>,
        scope: Option<&ScopeKey>,
    ) -> Result<ContextResult, ContextError> {
        let chunks = self
            .scored_chunks(query, document_type, options.min_relevance, scope)
            .await?;

        let prefix = conversation_prefix(
            history,
            &options.conversation,
            &options.column_delimiter,
            options.max_context_tokens,
            self.counter.as_ref(),
        );

        let header: Vec<String> = CHUNK_HEADER.iter().map(|c| c.to_string()).collect();
        let packer = BatchPacker::new(
            options.context_name.clone(),
            options.max_context_tokens.saturating_sub(prefix.tokens),
        )
        .with_delimiter(options.column_delimiter.clone())
        .with_single_batch(options.single_batch)
        .with_shuffle(options.shuffle_data.then_some(options.random_state))
        .with_counter(self.counter.clone());

        let packed = packer.pack(chunks, &header, Self::row);
        info!(
            packed = packed.table.len(),
            batches = packed.batches.len(),
            "Built local context"
        );
        Ok(assemble(prefix, packed, &options.context_name))
    }

    /// The `k` documents whose chunks are most relevant to `query`.
    ///
    /// Relevance is summed per chunk's first document title.
    pub async fn top_k_documents(
        &self,
        query: &str,
        k: usize,
        document_type: Option<&str>,
        min_relevance: f64,
        scope: Option<&ScopeKey>,
    ) -> Result<Vec<(String, f64)>, ContextError> {
        let chunks = self
            .scored_chunks(query, document_type, min_relevance, scope)
            .await?;

        let mut totals: HashMap<String, f64> = HashMap::new();
        for chunk in chunks {
            if let Some(title) = chunk.document_titles.first() {
                *totals.entry(title.clone()).or_default() += chunk.relevance_score;
            }
        }

        let mut ranked: Vec<(String, f64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        Ok(ranked)
    }
}

#[async_trait]
impl ContextBuilder for LocalContextBuilder {
    type Options = LocalContextOptions;

    async fn build_context(
        &self,
        query: &str,
        history: Option<&ConversationHistory>,
        options: &LocalContextOptions,
        scope: Option<&ScopeKey>,
    ) -> Result<ContextResult, ContextError> {
        self.build_context_for_type(query, history, options, None, scope)
            .await
    }
}
