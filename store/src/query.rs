//! Query filters shared by all backends.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A single predicate on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals `value`. A `null` value also matches an absent field.
    Eq { field: String, value: Value },
    /// Field holds a timestamp strictly later than `at`.
    After { field: String, at: DateTime<Utc> },
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::After { field, .. } => field,
        }
    }

    /// Evaluate against an in-memory body.
    pub(crate) fn matches(&self, body: &Value) -> bool {
        match self {
            Self::Eq { field, value } => body.get(field).unwrap_or(&Value::Null) == value,
            Self::After { field, at } => body
                .get(field)
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .is_some_and(|ts| ts > *at),
        }
    }
}

/// ANDed filters plus an optional result cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn after(mut self, field: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.filters.push(Filter::After {
            field: field.into(),
            at,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, body: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(body))
    }
}

/// Canonical timestamp encoding for stored documents.
///
/// Fixed-width RFC 3339 in UTC with millisecond precision, so SQLite can
/// compare encoded values lexicographically.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
