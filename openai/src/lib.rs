//! Minimal client for the OpenAI Chat Completions API.
//!
//! Sends one user message and returns the first choice's text. There is
//! no streaming, tool calling or retry logic; each call is a single POST.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use snsdiag_utils_string::take_bytes_at_char_boundary;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

/// Upper bound on how much of an unparsed error body is kept.
const ERROR_SNIPPET_BYTES: usize = 512;

/// Errors from a completion call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network request failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error ({status}): {message}")]
    ApiResponse { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The first choice carried no text content.
    #[error("completion contained no content")]
    EmptyCompletion,

    /// Client could not be constructed from the given settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API root, e.g. `https://api.openai.com/v1`. A trailing slash is optional.
    pub base_url: String,
    pub organization: Option<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }
}

/// A single-prompt completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Chat Completions client. Cheap to clone; the underlying connection pool
/// is shared.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ApiError::InvalidConfig("API key is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        if let Some(org) = &config.organization {
            let value = HeaderValue::from_str(org).map_err(|_| {
                ApiError::InvalidConfig("organization is not a valid header value".into())
            })?;
            headers.insert("OpenAI-Organization", value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        let endpoint = format!(
            "{}/{CHAT_COMPLETIONS_PATH}",
            config.base_url.trim_end_matches('/')
        );
        Ok(Self { http, endpoint })
    }

    /// Run one completion and return the first choice's text.
    pub async fn complete(&self, request: &ChatRequest) -> ApiResult<String> {
        let body = WireRequest {
            model: &request.model,
            messages: [WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(model = %request.model, max_tokens = request.max_tokens, "chat completion request");
        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => envelope.error.message,
                Err(_) => take_bytes_at_char_boundary(&text, ERROR_SNIPPET_BYTES).to_string(),
            };
            return Err(ApiError::ApiResponse {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: WireResponse =
            serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ApiError::EmptyCompletion)
    }
}
