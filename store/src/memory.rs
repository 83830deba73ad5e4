//! Process-local backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Document, DocumentStore, Query, Result, ensure_object};

/// In-memory [`DocumentStore`]. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, body: serde_json::Value) -> Result<String> {
        ensure_object(&body)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                body,
            });
        Ok(id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let guard = self.collections.lock();
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = docs.iter().filter(|doc| query.matches(&doc.body)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map_or(0, Vec::len))
    }
}
