//! Retrieval tools for the hybridrag agent.
//!
//! The agent can reach two backends: the document graph (global search over
//! community reports, local search over chunks, raw Cypher) and the
//! relational store (table listing, schemas, sample rows, SQL). The set of
//! tools is closed; definition files only choose which of them are offered.

pub mod catalog;
pub mod dispatcher;
pub mod structured;
pub mod synthesis;
pub mod unstructured;

pub use catalog::{BuiltinTool, CatalogEntry, ToolCatalog};
pub use dispatcher::ToolDispatcher;
pub use structured::StructuredService;
pub use synthesis::{AnswerSynthesizer, NO_DATA_ANSWER};
pub use unstructured::UnstructuredService;
