//! Request orchestration for both submission paths.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use snsdiag_store::DocumentStore;

use crate::backends::Backends;
use crate::errors::Result;
use crate::intake::{IntakeGate, RawSubmission};
use crate::recorder::{DetailRequest, SubmissionRecorder};
use crate::strategy::{StrategyGenerator, StrategyPayload};

/// Stateless per call; all shared state lives in [`Backends`].
#[derive(Clone)]
pub struct DiagnosisService {
    backends: Arc<Backends>,
}

impl DiagnosisService {
    pub fn new(backends: Arc<Backends>) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Intake gates, one generation call, then one log write.
    pub async fn submit_diagnosis(
        &self,
        body: Value,
        forwarded_for: Option<&str>,
    ) -> Result<StrategyPayload> {
        let config = self.backends.config();
        let store = self.backends.store().await?;
        let raw = RawSubmission::from_value(body);

        let admitted = IntakeGate::new(
            store.as_ref(),
            &config.store.diagnosis_collection,
            config.mode,
            config.limits.ip_window(),
        )
        .admit(&raw, forwarded_for, Utc::now())
        .await?;

        let generator = self.backends.generator().await?;
        let strategy = StrategyGenerator::new(generator.as_ref())
            .generate(&admitted)
            .await?;

        self.recorder(store.as_ref())
            .record_diagnosis(&admitted, &strategy, Utc::now())
            .await?;
        Ok(strategy)
    }

    /// Unvalidated append to the detail-request log.
    pub async fn submit_detail_request(&self, body: Value) -> Result<String> {
        let store = self.backends.store().await?;
        let request = DetailRequest::from_value(body);
        self.recorder(store.as_ref())
            .record_detail_request(&request, Utc::now())
            .await
    }

    fn recorder<'a>(&'a self, store: &'a dyn DocumentStore) -> SubmissionRecorder<'a> {
        let config = self.backends.config();
        SubmissionRecorder::new(
            store,
            &config.store.diagnosis_collection,
            &config.store.detail_collection,
        )
    }
}
