//! End-to-end tests: router -> pipeline -> in-memory store, with the
//! Chat Completions endpoint mocked.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use snsdiag_openai::{OpenAiClient, OpenAiConfig};
use snsdiag_service::config::StoreBackend;
use snsdiag_service::strategy::OpenAiGenerator;
use snsdiag_service::{Backends, DiagnosisService, RunMode, ServiceConfig, build_router};
use snsdiag_store::{DocumentStore, Query, SqliteStore};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY_LIMIT: usize = 1_048_576;
const DIAGNOSIS: &str = "snsDiagnosisLogs";
const DETAIL: &str = "snsDetailedRequests";

const STRATEGY_JSON: &str = r#"{
  "strategy": {"title": "Cafe growth", "content": "Post reels three times a week", "note": "Be consistent"},
  "journeyMap": {
    "awareness": {"goal": "Be discovered", "action": "Local hashtags"},
    "interest": {"goal": "Earn follows", "action": "Menu series"},
    "consideration": {"goal": "Build trust", "action": "Customer stories"},
    "action": {"goal": "Visit the store", "action": "Follower coupon"}
  }
}"#;

struct Harness {
    app: Router,
    service: DiagnosisService,
    server: MockServer,
}

impl Harness {
    fn config(mode: RunMode, server: &MockServer) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.mode = mode;
        config.store.backend = StoreBackend::Memory;
        config.generation.api_key = Some("sk-test".into());
        config.generation.base_url = format!("{}/v1", server.uri());
        config
    }

    fn from_backends(backends: Backends, server: MockServer) -> Self {
        let service = DiagnosisService::new(Arc::new(backends));
        let app = build_router(service.clone());
        Self { app, service, server }
    }

    /// Everything built from config, with the in-memory store.
    async fn start(mode: RunMode) -> Self {
        let server = MockServer::start().await;
        let config = Self::config(mode, &server);
        Self::from_backends(Backends::new(config), server)
    }

    /// Same wiring over an in-memory SQLite database.
    async fn start_sqlite(mode: RunMode) -> Self {
        let server = MockServer::start().await;
        let config = Self::config(mode, &server);
        let client = OpenAiClient::new(
            &OpenAiConfig::new("sk-test").with_base_url(&config.generation.base_url),
        )
        .unwrap();
        let generator = Arc::new(OpenAiGenerator::new(client, &config.generation));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        Self::from_backends(Backends::with_handles(config, store, generator), server)
    }

    async fn mock_completion(&self, content: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    async fn post(&self, uri: &str, ip: Option<&str>, body: impl Into<Body>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body.into()).unwrap())
            .await
            .expect("router call");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn diagnose(&self, ip: &str, body: Value) -> (StatusCode, Value) {
        self.post("/api/diagnosis", Some(ip), body.to_string()).await
    }

    async fn entries(&self, collection: &str) -> Vec<Value> {
        let store = self.service.backends().store().await.unwrap();
        store
            .query(collection, &Query::new())
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.body)
            .collect()
    }
}

fn submission(email: &str) -> Value {
    json!({
        "sns": "Instagram",
        "currentFollowers": "500",
        "targetFollowers": "1000",
        "targetAudience": "20s",
        "snsGoal": "grow",
        "brandConcept": "simple",
        "industry": "cafe",
        "email": email
    })
}

#[tokio::test]
async fn diagnosis_returns_strategy_and_records_one_entry() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(&format!("```json\n{STRATEGY_JSON}\n```"), 1).await;

    let (status, body) = h.diagnose("203.0.113.7, 10.0.0.1", submission("a@b.com")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["strategy"]["title"], "Cafe growth");
    assert_eq!(body["data"]["journeyMap"]["action"]["goal"], "Visit the store");

    let entries = h.entries(DIAGNOSIS).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["current"], 500);
    assert_eq!(entries[0]["target"], 1000);
    assert_eq!(entries[0]["ip"], "203.0.113.7");
    assert_eq!(entries[0]["email"], "a@b.com");
    assert_eq!(entries[0]["aiStrategy"], body["data"]);
    assert!(entries[0]["createdAt"].is_string());
}

#[tokio::test]
async fn repeat_ip_within_window_is_rate_limited() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 1).await;

    let (first, _) = h.diagnose("198.51.100.1", submission("first@b.com")).await;
    assert_eq!(first, StatusCode::OK);

    let (status, body) = h.diagnose("198.51.100.1", submission("second@b.com")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body,
        json!({"success": false, "error": "Only one diagnosis per IP address is allowed per hour."})
    );
    assert_eq!(h.entries(DIAGNOSIS).await.len(), 1);
}

#[tokio::test]
async fn development_mode_skips_ip_throttle() {
    let h = Harness::start(RunMode::Development).await;
    h.mock_completion(STRATEGY_JSON, 2).await;

    let (first, _) = h.diagnose("198.51.100.1", submission("first@b.com")).await;
    let (second, _) = h.diagnose("198.51.100.1", submission("second@b.com")).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(h.entries(DIAGNOSIS).await.len(), 2);
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 1).await;

    h.diagnose("192.0.2.1", submission("dup@b.com")).await;
    let (status, body) = h.diagnose("192.0.2.2", submission("dup@b.com")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This email address has already been diagnosed.");
    assert_eq!(h.entries(DIAGNOSIS).await.len(), 1);
}

#[tokio::test]
async fn invalid_email_never_reaches_generator() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 0).await;

    let (status, body) = h.diagnose("192.0.2.9", submission("not-an-email")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please enter a valid email address.");
    assert!(h.entries(DIAGNOSIS).await.is_empty());
}

#[tokio::test]
async fn unparsable_generation_stores_nothing() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion("Sorry, I can't help with that.", 1).await;

    let (status, body) = h.diagnose("192.0.2.10", submission("x@b.com")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"success": false, "error": "Failed to parse the AI response."}));
    assert!(h.entries(DIAGNOSIS).await.is_empty());
}

#[tokio::test]
async fn upstream_error_is_generic_failure() {
    let h = Harness::start(RunMode::Production).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "internal upstream detail"}
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = h.diagnose("192.0.2.11", submission("y@b.com")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"success": false, "error": "Diagnosis failed."}));
    assert!(h.entries(DIAGNOSIS).await.is_empty());
}

#[tokio::test]
async fn malformed_json_body_is_generic_failure() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 0).await;

    let (status, body) = h.post("/api/diagnosis", Some("192.0.2.12"), "{not json").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Diagnosis failed.");
}

#[tokio::test]
async fn detail_request_always_records_one_entry() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 0).await;

    let (status, body) = h
        .post(
            "/api/request-detail",
            None,
            json!({
                "sns": "X",
                "accountName": "foo",
                "aiResult": {"strategy": {"title": "t"}},
                "email": "a@b.com"
            })
            .to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let entries = h.entries(DETAIL).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["accountName"], "foo");
    assert_eq!(entries[0]["email"], "a@b.com");
    assert!(entries[0]["requestedAt"].is_string());
    assert!(h.entries(DIAGNOSIS).await.is_empty());
}

#[tokio::test]
async fn detail_request_after_diagnosis_for_same_email() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 1).await;

    let (diagnosed, diagnosis) = h.diagnose("192.0.2.20", submission("a@b.com")).await;
    assert_eq!(diagnosed, StatusCode::OK);

    let (status, body) = h
        .post(
            "/api/request-detail",
            Some("192.0.2.20"),
            json!({
                "sns": "X",
                "accountName": "foo",
                "aiResult": diagnosis["data"],
                "email": "a@b.com"
            })
            .to_string(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    let details = h.entries(DETAIL).await;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["email"], "a@b.com");
    assert_eq!(details[0]["aiResult"], diagnosis["data"]);
    assert_eq!(h.entries(DIAGNOSIS).await.len(), 1);
}

#[tokio::test]
async fn null_body_is_an_empty_submission() {
    let h = Harness::start(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 0).await;

    let (status, body) = h.post("/api/diagnosis", Some("192.0.2.30"), "null").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please enter a valid email address.");

    let (status, body) = h.post("/api/request-detail", None, "null").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    let details = h.entries(DETAIL).await;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].as_object().map(|o| o.len()), Some(1));
    assert!(details[0]["requestedAt"].is_string());
}

#[tokio::test]
async fn sqlite_backend_enforces_ip_and_email_gates() {
    let h = Harness::start_sqlite(RunMode::Production).await;
    h.mock_completion(STRATEGY_JSON, 1).await;

    let (first, _) = h.diagnose("198.51.100.5", submission("sq@b.com")).await;
    assert_eq!(first, StatusCode::OK);

    let (same_ip, body) = h.diagnose("198.51.100.5", submission("other@b.com")).await;
    assert_eq!(same_ip, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Only one diagnosis per IP address is allowed per hour.");

    let (same_email, body) = h.diagnose("198.51.100.6", submission("sq@b.com")).await;
    assert_eq!(same_email, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This email address has already been diagnosed.");

    let entries = h.entries(DIAGNOSIS).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["current"], 500);
    assert_eq!(entries[0]["ip"], "198.51.100.5");
}

#[tokio::test]
async fn detail_request_with_malformed_body_reports_save_failure() {
    let h = Harness::start(RunMode::Production).await;

    let (status, body) = h.post("/api/request-detail", None, "").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"success": false, "error": "Failed to save the request."}));
    assert!(h.entries(DETAIL).await.is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let h = Harness::start(RunMode::Production).await;
    let response = h
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}
