//! `snsdiag-service`: SNS diagnosis intake backend.
//!
//! Accepts an account profile, enforces the per-IP throttle and one
//! diagnosis per email, asks a text-generation model for a growth
//! strategy, and appends the result to an immutable log. A second
//! endpoint records "send me more detail" follow-ups without validation.

pub mod backends;
pub mod config;
pub mod errors;
pub mod http;
pub mod intake;
pub mod pipeline;
pub mod protocol;
pub mod recorder;
pub mod strategy;

pub use backends::Backends;
pub use config::{ConfigError, RunMode, ServiceConfig};
pub use errors::{DiagnosisError, ErrorCategory, Result};
pub use http::build_router;
pub use pipeline::DiagnosisService;
pub use strategy::{StrategyPayload, TextGenerator};
