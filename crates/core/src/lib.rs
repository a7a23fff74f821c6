//! # hybridrag Core
//!
//! Domain types, traits, and error definitions for the hybridrag question
//! answering engine. This crate performs no I/O; it defines the domain model
//! that the store, context, tool and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every backend is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted providers and in-memory stores
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod record;
pub mod scope;
pub mod store;
pub mod search;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, ProviderError, Result, StoreError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse,
    ToolDefinition, Usage,
};
pub use tool::{ToolCall, ToolClass, ToolResult};
pub use record::{Chunk, CommunityReport, Record};
pub use scope::{EmptyScopeKey, ScopeKey};
pub use store::{ColumnInfo, GraphStore, HealthReport, JsonRow, QueryOutcome, RelationalStore};
pub use search::{ConversationHistoryOptions, GlobalContextOptions, LocalContextOptions};
pub use event::{DomainEvent, EventBus};
