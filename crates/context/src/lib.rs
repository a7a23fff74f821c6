//! # hybridrag Context
//!
//! Builds the token-budgeted text an answering model sees for a query:
//! scoped retrieval, relevance scoring, community weighting, and packing of
//! records into delimiter-separated batches under a token ceiling.

pub mod builder;
pub mod conversation;
pub mod packer;
pub mod relevance;
pub mod token;
pub mod weight;

pub use builder::{ContextBuilder, ContextResult, GlobalContextBuilder, LocalContextBuilder};
pub use conversation::{ConversationHistory, ConversationTurn, QaTurn};
pub use packer::{BatchPacker, ContextTable, Packable, PackedContext};
pub use relevance::EmbeddingScorer;
pub use token::{HeuristicCounter, TokenCounter, estimate_tokens};
pub use weight::assign_weights;
