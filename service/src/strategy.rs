//! Strategy generation: prompt construction, the upstream call, and
//! parsing of the model's JSON reply.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use snsdiag_openai::{ApiError, ChatRequest, OpenAiClient};

use crate::config::GenerationConfig;
use crate::errors::{DiagnosisError, Result};
use crate::intake::AdmittedSubmission;

/// Growth ratio above which the model is asked to moderate the target.
pub const GROWTH_RATIO_CEILING: u64 = 10;

/// Generated strategy returned to the caller and stored with the log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPayload {
    pub strategy: StrategyCard,
    #[serde(rename = "journeyMap")]
    pub journey_map: JourneyMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCard {
    pub title: String,
    pub content: String,
    pub note: String,
}

/// Four-stage funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyMap {
    pub awareness: JourneyStage,
    pub interest: JourneyStage,
    pub consideration: JourneyStage,
    pub action: JourneyStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyStage {
    pub goal: String,
    pub action: String,
}

/// Opaque text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ApiError>;
}

/// [`TextGenerator`] over the Chat Completions API with fixed sampling.
pub struct OpenAiGenerator {
    client: OpenAiClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(client: OpenAiClient, config: &GenerationConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> std::result::Result<String, ApiError> {
        self.client
            .complete(&ChatRequest {
                model: self.model.clone(),
                prompt: prompt.to_string(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            })
            .await
    }
}

fn growth_note(current: u64, target: u64) -> String {
    if target <= current {
        return "The target does not exceed the current follower count.".to_string();
    }
    if current == 0 {
        return "The account is starting from zero followers.".to_string();
    }
    let ratio = target as f64 / current as f64;
    format!("The requested growth is {ratio:.1}x the current follower count.")
}

/// Build the single instruction sent upstream.
pub fn build_prompt(s: &AdmittedSubmission) -> String {
    format!(
        r#"You are an SNS marketing strategist. Propose a realistic growth strategy for the account below.

Account details:
- Platform: {sns}
- Current followers: {current}
- Target followers: {target}
- Target audience: {audience}
- Account goal: {goal}
- Brand concept: {concept}
- Industry: {industry}

{growth}

Rules:
1. If the target is more than {ceiling}x the current follower count, propose a moderated, achievable target instead and explain why.
2. If the target is less than or equal to the current follower count, propose a maintenance strategy focused on engagement and retention.
3. Do not rely on paid advertising or paid promotion.
4. Respond with a single JSON object only, no commentary, in exactly this shape:

{{
  "strategy": {{ "title": "...", "content": "...", "note": "..." }},
  "journeyMap": {{
    "awareness": {{ "goal": "...", "action": "..." }},
    "interest": {{ "goal": "...", "action": "..." }},
    "consideration": {{ "goal": "...", "action": "..." }},
    "action": {{ "goal": "...", "action": "..." }}
  }}
}}"#,
        sns = s.sns,
        current = s.current_followers,
        target = s.target_followers,
        audience = s.target_audience,
        goal = s.sns_goal,
        concept = s.brand_concept,
        industry = s.industry,
        growth = growth_note(s.current_followers, s.target_followers),
        ceiling = GROWTH_RATIO_CEILING,
    )
}

fn fence_open_regex() -> Option<&'static Regex> {
    static FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE_RE
        .get_or_init(|| Regex::new(r"(?i)```[a-z]*\n?").ok())
        .as_ref()
}

/// Remove Markdown code-fence delimiters (with optional language tag)
/// anywhere in `raw`, then trim.
pub fn strip_code_fences(raw: &str) -> String {
    let without_openers = match fence_open_regex() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    without_openers.replace("```", "").trim().to_string()
}

/// Parse fence-stripped model output into a typed strategy.
///
/// Empty output is treated as `{}`, which fails the shape check like any
/// other malformed reply.
pub fn parse_strategy(raw: &str) -> Result<StrategyPayload> {
    let cleaned = strip_code_fences(raw);
    let text = if cleaned.is_empty() { "{}" } else { cleaned.as_str() };
    serde_json::from_str(text).map_err(|e| DiagnosisError::ResponseParse(e.to_string()))
}

/// One generation round trip for an admitted submission.
pub struct StrategyGenerator<'a> {
    backend: &'a dyn TextGenerator,
}

impl<'a> StrategyGenerator<'a> {
    pub fn new(backend: &'a dyn TextGenerator) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, submission: &AdmittedSubmission) -> Result<StrategyPayload> {
        let prompt = build_prompt(submission);
        let raw = self.backend.generate(&prompt).await?;
        let payload = parse_strategy(&raw)?;
        tracing::debug!(title = %payload.strategy.title, "strategy generated");
        Ok(payload)
    }
}
