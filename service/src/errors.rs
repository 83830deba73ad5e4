//! Error taxonomy for the intake pipeline.
//!
//! Every failure is terminal for its request. Only [`DiagnosisError::public_message`]
//! is ever shown to a caller; the `Display` text is for logs.

use snsdiag_openai::ApiError;
use snsdiag_store::StoreError;
use thiserror::Error;

/// Broad failure class, used for log fields and status selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed, throttled or duplicate input
    Validation,
    /// Upstream text service failed or returned unusable output
    Generation,
    /// Store read or write failed
    Persistence,
    /// Misconfiguration or anything unexpected
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Generation => "GENERATION",
            Self::Persistence => "PERSISTENCE",
            Self::Internal => "INTERNAL",
        }
    }
}

pub const MSG_IP_RATE_LIMITED: &str = "Only one diagnosis per IP address is allowed per hour.";
pub const MSG_EMAIL_ALREADY_USED: &str = "This email address has already been diagnosed.";
pub const MSG_INVALID_EMAIL: &str = "Please enter a valid email address.";
pub const MSG_PARSE_FAILED: &str = "Failed to parse the AI response.";
pub const MSG_DIAGNOSIS_FAILED: &str = "Diagnosis failed.";
pub const MSG_SAVE_FAILED: &str = "Failed to save the request.";

#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("ip {ip} already submitted within the throttle window")]
    IpRateLimited { ip: String },

    #[error("email already has a diagnosis on record")]
    EmailAlreadyUsed,

    #[error("email failed format check")]
    InvalidEmail,

    #[error("generation failed: {0}")]
    Generation(#[from] ApiError),

    #[error("generated strategy could not be parsed: {0}")]
    ResponseParse(String),

    #[error("store error: {0}")]
    Persistence(#[from] StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DiagnosisError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::IpRateLimited { .. } | Self::EmailAlreadyUsed | Self::InvalidEmail => {
                ErrorCategory::Validation
            }
            Self::Generation(_) | Self::ResponseParse(_) => ErrorCategory::Generation,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Config(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            Self::IpRateLimited { .. } => 429,
            Self::EmailAlreadyUsed | Self::InvalidEmail => 400,
            _ => 500,
        }
    }

    /// Caller-facing reason. Internal detail never leaks through here.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::IpRateLimited { .. } => MSG_IP_RATE_LIMITED,
            Self::EmailAlreadyUsed => MSG_EMAIL_ALREADY_USED,
            Self::InvalidEmail => MSG_INVALID_EMAIL,
            Self::ResponseParse(_) => MSG_PARSE_FAILED,
            Self::Generation(_) | Self::Persistence(_) | Self::Config(_) | Self::Internal(_) => {
                MSG_DIAGNOSIS_FAILED
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DiagnosisError>;
