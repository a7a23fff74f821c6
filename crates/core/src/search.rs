//! Context assembly options shared by configuration and the context builders.

use serde::{Deserialize, Serialize};

/// Default answer shape requested from search answer synthesis.
pub const DEFAULT_RESPONSE_TYPE: &str = "multiple paragraphs";

/// How prior conversation turns are rendered ahead of retrieved records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistoryOptions {
    /// Keep only the user side of each turn.
    #[serde(default = "default_true")]
    pub include_user_turns_only: bool,

    /// Oldest turns kept, counted from the beginning of the conversation.
    #[serde(default = "default_max_qa_turns")]
    pub max_qa_turns: usize,

    #[serde(default = "default_history_name")]
    pub context_name: String,
}

impl Default for ConversationHistoryOptions {
    fn default() -> Self {
        Self {
            include_user_turns_only: true,
            max_qa_turns: default_max_qa_turns(),
            context_name: default_history_name(),
        }
    }
}

/// Options for packing community reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalContextOptions {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Render the short summary instead of the full content.
    #[serde(default)]
    pub use_community_summary: bool,

    #[serde(default = "default_delimiter")]
    pub column_delimiter: String,

    #[serde(default = "default_true")]
    pub shuffle_data: bool,

    #[serde(default = "default_true")]
    pub include_community_rank: bool,

    /// Reports ranked below this are dropped when rank is included.
    #[serde(default)]
    pub min_community_rank: f64,

    #[serde(default = "default_rank_name")]
    pub community_rank_name: String,

    #[serde(default = "default_true")]
    pub include_community_weight: bool,

    #[serde(default = "default_weight_name")]
    pub community_weight_name: String,

    #[serde(default = "default_true")]
    pub normalize_community_weight: bool,

    #[serde(default = "default_reports_name")]
    pub context_name: String,

    #[serde(default = "default_random_state")]
    pub random_state: u64,

    /// Stop at the first overflow instead of opening another batch.
    #[serde(default)]
    pub single_batch: bool,

    #[serde(default)]
    pub conversation: ConversationHistoryOptions,
}

impl Default for GlobalContextOptions {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            use_community_summary: false,
            column_delimiter: default_delimiter(),
            shuffle_data: true,
            include_community_rank: true,
            min_community_rank: 0.0,
            community_rank_name: default_rank_name(),
            include_community_weight: true,
            community_weight_name: default_weight_name(),
            normalize_community_weight: true,
            context_name: default_reports_name(),
            random_state: default_random_state(),
            single_batch: false,
            conversation: ConversationHistoryOptions::default(),
        }
    }
}

/// Options for packing text chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalContextOptions {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    #[serde(default = "default_delimiter")]
    pub column_delimiter: String,

    #[serde(default)]
    pub shuffle_data: bool,

    #[serde(default = "default_random_state")]
    pub random_state: u64,

    /// Chunks scoring below this cosine similarity are dropped.
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,

    #[serde(default = "default_chunks_name")]
    pub context_name: String,

    #[serde(default)]
    pub single_batch: bool,

    #[serde(default)]
    pub conversation: ConversationHistoryOptions,
}

impl Default for LocalContextOptions {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            column_delimiter: default_delimiter(),
            shuffle_data: false,
            random_state: default_random_state(),
            min_relevance: default_min_relevance(),
            context_name: default_chunks_name(),
            single_batch: false,
            conversation: ConversationHistoryOptions::default(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_qa_turns() -> usize {
    5
}
fn default_history_name() -> String {
    "Conversation History".into()
}
fn default_max_context_tokens() -> usize {
    8000
}
fn default_delimiter() -> String {
    "|".into()
}
fn default_rank_name() -> String {
    "rank".into()
}
fn default_weight_name() -> String {
    "occurrence weight".into()
}
fn default_reports_name() -> String {
    "Reports".into()
}
fn default_chunks_name() -> String {
    "Chunks".into()
}
fn default_random_state() -> u64 {
    86
}
fn default_min_relevance() -> f64 {
    0.3
}
