//! `snsdiag-store`: append-only document collections.
//!
//! Each collection is a log of JSON object documents. Callers can insert
//! and query (exact field match plus timestamp lower bound); nothing is
//! ever updated or deleted through this API.
//!
//! Two backends share the [`DocumentStore`] trait:
//! - [`MemoryStore`]: process-local, used for development and tests
//! - [`SqliteStore`]: single-file SQLite with JSON bodies

mod memory;
mod query;
mod sqlite;

pub use memory::MemoryStore;
pub use query::{Filter, Query, format_timestamp, parse_timestamp};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

/// Errors from a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("document body must be a JSON object, got {0}")]
    InvalidDocument(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A stored document together with its server-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: serde_json::Value,
}

/// Append-only collection store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append `body` to `collection`. Returns the new document id.
    async fn insert(&self, collection: &str, body: serde_json::Value) -> Result<String>;

    /// Documents in `collection` matching every filter, oldest first,
    /// truncated to the query limit.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Number of documents in `collection`.
    async fn count(&self, collection: &str) -> Result<usize>;
}

fn ensure_object(body: &serde_json::Value) -> Result<()> {
    if body.is_object() {
        Ok(())
    } else {
        let kind = match body {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "a boolean",
            serde_json::Value::Number(_) => "a number",
            serde_json::Value::String(_) => "a string",
            serde_json::Value::Array(_) => "an array",
            serde_json::Value::Object(_) => "an object",
        };
        Err(StoreError::InvalidDocument(kind.to_string()))
    }
}
