//! Submission intake: normalisation and the rate-limit gates.
//!
//! Gates run in a fixed order and the first failure wins:
//! 1. cap every text field
//! 2. derive the client IP
//! 3. IP throttle (skipped in development mode)
//! 4. email uniqueness
//! 5. follower counts
//! 6. email format
//!
//! The throttle and uniqueness reads are not atomic with the later write;
//! two concurrent requests can both pass.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::Deserialize;
use serde_json::Value;
use snsdiag_store::{DocumentStore, Query};
use snsdiag_utils_string::capped;

use crate::config::RunMode;
use crate::errors::{DiagnosisError, Result};
use crate::recorder::fields;

/// Per-field character limits.
pub mod limits {
    pub const SNS: usize = 30;
    pub const TARGET_AUDIENCE: usize = 100;
    pub const SNS_GOAL: usize = 100;
    pub const BRAND_CONCEPT: usize = 200;
    pub const INDUSTRY: usize = 100;
    pub const EMAIL: usize = 200;
}

/// IP recorded when no forwarded-for header is present.
pub const UNKNOWN_IP: &str = "unknown";

/// Submission fields exactly as the client sent them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSubmission {
    #[serde(default)]
    pub sns: Option<Value>,
    #[serde(default)]
    pub current_followers: Option<Value>,
    #[serde(default)]
    pub target_followers: Option<Value>,
    #[serde(default)]
    pub target_audience: Option<Value>,
    #[serde(default)]
    pub sns_goal: Option<Value>,
    #[serde(default)]
    pub brand_concept: Option<Value>,
    #[serde(default)]
    pub industry: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
}

impl RawSubmission {
    /// Read fields from a request body. Anything other than an object
    /// yields an all-empty submission.
    pub fn from_value(body: Value) -> Self {
        if body.is_object() {
            serde_json::from_value(body).unwrap_or_default()
        } else {
            Self::default()
        }
    }
}

/// Coerce a loosely-typed field to text. Absent and `null` become empty.
pub fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Text fields after length capping. Follower counts are still raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSubmission {
    pub sns: String,
    pub target_audience: String,
    pub sns_goal: String,
    pub brand_concept: String,
    pub industry: String,
    pub email: String,
    pub current_followers: String,
    pub target_followers: String,
}

impl NormalizedSubmission {
    pub fn normalize(raw: &RawSubmission) -> Self {
        let cap = |value: &Option<Value>, max: usize| capped(&coerce_text(value.as_ref()), max);
        Self {
            sns: cap(&raw.sns, limits::SNS),
            target_audience: cap(&raw.target_audience, limits::TARGET_AUDIENCE),
            sns_goal: cap(&raw.sns_goal, limits::SNS_GOAL),
            brand_concept: cap(&raw.brand_concept, limits::BRAND_CONCEPT),
            industry: cap(&raw.industry, limits::INDUSTRY),
            email: cap(&raw.email, limits::EMAIL),
            current_followers: coerce_text(raw.current_followers.as_ref()),
            target_followers: coerce_text(raw.target_followers.as_ref()),
        }
    }
}

/// A submission that passed every gate and is ready for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedSubmission {
    pub sns: String,
    pub current_followers: u64,
    pub target_followers: u64,
    pub target_audience: String,
    pub sns_goal: String,
    pub brand_concept: String,
    pub industry: String,
    pub email: String,
    pub ip: String,
}

/// First comma-separated token of a forwarded-for header, or [`UNKNOWN_IP`].
pub fn client_ip(forwarded_for: Option<&str>) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

/// Base-10 integer prefix, clamped at zero.
///
/// Leading whitespace and one sign are accepted, parsing stops at the
/// first non-digit. No digits means zero; negative values become zero;
/// values beyond `u64::MAX` saturate.
pub fn parse_follower_count(raw: &str) -> u64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: u64 = 0;
    let mut seen_digit = false;
    for b in digits.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        seen_digit = true;
        value = value.saturating_mul(10).saturating_add(u64::from(b - b'0'));
    }

    if !seen_digit || negative { 0 } else { value }
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

/// Basic `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_some_and(|re| re.is_match(email))
}

/// Runs the intake gates against the diagnosis log.
pub struct IntakeGate<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
    mode: RunMode,
    ip_window: chrono::Duration,
}

impl<'a> IntakeGate<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        collection: &'a str,
        mode: RunMode,
        ip_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            collection,
            mode,
            ip_window,
        }
    }

    pub async fn admit(
        &self,
        raw: &RawSubmission,
        forwarded_for: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AdmittedSubmission> {
        let normalized = NormalizedSubmission::normalize(raw);
        let ip = client_ip(forwarded_for);

        if !self.mode.is_development() {
            let recent = self
                .store
                .query(
                    self.collection,
                    &Query::new()
                        .eq(fields::IP, ip.as_str())
                        .after(fields::CREATED_AT, now - self.ip_window)
                        .limit(1),
                )
                .await?;
            if !recent.is_empty() {
                return Err(DiagnosisError::IpRateLimited { ip });
            }
        }

        let existing = self
            .store
            .query(
                self.collection,
                &Query::new()
                    .eq(fields::EMAIL, normalized.email.as_str())
                    .limit(1),
            )
            .await?;
        if !existing.is_empty() {
            return Err(DiagnosisError::EmailAlreadyUsed);
        }

        let current_followers = parse_follower_count(&normalized.current_followers);
        let target_followers = parse_follower_count(&normalized.target_followers);

        if !is_valid_email(&normalized.email) {
            return Err(DiagnosisError::InvalidEmail);
        }

        Ok(AdmittedSubmission {
            sns: normalized.sns,
            current_followers,
            target_followers,
            target_audience: normalized.target_audience,
            sns_goal: normalized.sns_goal,
            brand_concept: normalized.brand_concept,
            industry: normalized.industry,
            email: normalized.email,
            ip,
        })
    }
}
