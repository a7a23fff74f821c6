//! Store backends for hybridrag.
//!
//! - [`Neo4jHttpStore`]: the document/entity/community graph over Neo4j's
//!   HTTP transactional endpoint
//! - [`PgRelationalStore`]: structured tables in PostgreSQL via `sqlx`
//! - [`InMemoryGraphStore`] / [`InMemoryRelationalStore`]: test doubles
//!
//! All of them implement the traits in `hybridrag_core::store`.

pub mod in_memory;
pub mod neo4j;
pub mod postgres;

pub use in_memory::{InMemoryGraphStore, InMemoryRelationalStore};
pub use neo4j::Neo4jHttpStore;
pub use postgres::PgRelationalStore;
