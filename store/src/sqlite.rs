//! SQLite backend.
//!
//! All collections share one `documents` table. Bodies are stored as JSON
//! text and filtered with `json_extract`, so a filter on a timestamp field
//! relies on the fixed-width encoding from [`format_timestamp`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::query::format_timestamp;
use crate::{Document, DocumentStore, Filter, Query, Result, StoreError, ensure_object};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    id         TEXT NOT NULL UNIQUE,
    collection TEXT NOT NULL,
    body       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection, seq);
"#;

/// SQLite-backed [`DocumentStore`].
///
/// A single connection is shared behind a mutex; every operation runs on
/// the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!(
                    "failed to create db directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::apply_schema(&conn)?;
        tracing::debug!(path = %path.display(), "document store opened");
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn apply_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

/// JSON path for a top-level field, quoted so any key is addressable.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

/// Map a JSON scalar onto the SQL value `json_extract` would yield for it.
fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn build_select(collection: &str, query: &Query) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
    let mut params = vec![SqlValue::Text(collection.to_string())];

    for filter in &query.filters {
        params.push(SqlValue::Text(json_path(filter.field())));
        match filter {
            Filter::Eq {
                value: Value::Null, ..
            } => sql.push_str(" AND json_extract(body, ?) IS NULL"),
            Filter::Eq { value, .. } => {
                sql.push_str(" AND json_extract(body, ?) = ?");
                params.push(sql_value(value));
            }
            Filter::After { at, .. } => {
                sql.push_str(" AND json_extract(body, ?) > ?");
                params.push(SqlValue::Text(format_timestamp(*at)));
            }
        }
    }

    sql.push_str(" ORDER BY seq");
    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }
    (sql, params)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &str, body: Value) -> Result<String> {
        ensure_object(&body)?;
        let id = uuid::Uuid::new_v4().to_string();
        let encoded = serde_json::to_string(&body)?;
        let collection = collection.to_string();
        let row_id = id.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, collection, body) VALUES (?1, ?2, ?3)",
                rusqlite::params![row_id, collection, encoded],
            )?;
            Ok(())
        })
        .await?;
        Ok(id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let (sql, params) = build_select(collection, query);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut docs = Vec::new();
            for row in rows {
                let (id, body) = row?;
                docs.push(Document {
                    id,
                    body: serde_json::from_str(&body)?,
                });
            }
            Ok(docs)
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                [collection],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }
}
