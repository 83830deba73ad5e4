//! Append-only writes for the diagnosis log and the detail-request log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snsdiag_store::{DocumentStore, format_timestamp};

use crate::errors::{DiagnosisError, Result};
use crate::intake::AdmittedSubmission;
use crate::strategy::StrategyPayload;

/// Stored field names that queries depend on.
pub mod fields {
    pub const IP: &str = "ip";
    pub const EMAIL: &str = "email";
    pub const CREATED_AT: &str = "createdAt";
    pub const REQUESTED_AT: &str = "requestedAt";
}

/// One row of the diagnosis log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisLogEntry {
    pub sns: String,
    pub current: u64,
    pub target: u64,
    pub target_audience: String,
    pub sns_goal: String,
    pub brand_concept: String,
    pub industry: String,
    pub email: String,
    pub ip: String,
    pub ai_strategy: StrategyPayload,
    pub created_at: String,
}

impl DiagnosisLogEntry {
    pub fn new(
        submission: &AdmittedSubmission,
        strategy: &StrategyPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sns: submission.sns.clone(),
            current: submission.current_followers,
            target: submission.target_followers,
            target_audience: submission.target_audience.clone(),
            sns_goal: submission.sns_goal.clone(),
            brand_concept: submission.brand_concept.clone(),
            industry: submission.industry.clone(),
            email: submission.email.clone(),
            ip: submission.ip.clone(),
            ai_strategy: strategy.clone(),
            created_at: format_timestamp(created_at),
        }
    }
}

/// Follow-up "send me more" payload, stored as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRequest {
    #[serde(default, skip_serializing_if = "is_absent")]
    pub sns: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub current_followers: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub target_followers: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub target_audience: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub sns_goal: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub brand_concept: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub industry: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub email: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub account_name: Option<Value>,
    #[serde(default, skip_serializing_if = "is_absent")]
    pub ai_result: Option<Value>,
}

// `null` deserialises to `None` as well, so both are dropped.
fn is_absent(value: &Option<Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

impl DetailRequest {
    /// Non-object bodies give an empty request.
    pub fn from_value(body: Value) -> Self {
        if body.is_object() {
            serde_json::from_value(body).unwrap_or_default()
        } else {
            Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailRequestEntry<'a> {
    #[serde(flatten)]
    request: &'a DetailRequest,
    requested_at: String,
}

/// Writes log entries to their collections.
pub struct SubmissionRecorder<'a> {
    store: &'a dyn DocumentStore,
    diagnosis_collection: &'a str,
    detail_collection: &'a str,
}

impl<'a> SubmissionRecorder<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        diagnosis_collection: &'a str,
        detail_collection: &'a str,
    ) -> Self {
        Self {
            store,
            diagnosis_collection,
            detail_collection,
        }
    }

    /// Append a diagnosis entry, returning its document id.
    pub async fn record_diagnosis(
        &self,
        submission: &AdmittedSubmission,
        strategy: &StrategyPayload,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let entry = DiagnosisLogEntry::new(submission, strategy, now);
        let body = serde_json::to_value(&entry)
            .map_err(|e| DiagnosisError::Internal(e.to_string()))?;
        let id = self.store.insert(self.diagnosis_collection, body).await?;
        tracing::info!(
            collection = self.diagnosis_collection,
            id = %id,
            ip = %submission.ip,
            "diagnosis recorded"
        );
        Ok(id)
    }

    /// Append a detail request, returning its document id.
    pub async fn record_detail_request(
        &self,
        request: &DetailRequest,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let entry = DetailRequestEntry {
            request,
            requested_at: format_timestamp(now),
        };
        let body = serde_json::to_value(&entry)
            .map_err(|e| DiagnosisError::Internal(e.to_string()))?;
        let id = self.store.insert(self.detail_collection, body).await?;
        tracing::info!(collection = self.detail_collection, id = %id, "detail request recorded");
        Ok(id)
    }
}
