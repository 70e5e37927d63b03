//! AI Augmentor - optional external analysis pass
//!
//! The core only depends on the [`Augmentor`] trait: given the payload and
//! the ids the catalog already matched, return a summary, insights and extra
//! shell fixes for anything the static rules missed.
//!
//! Implementations:
//! - [`HttpAugmentor`]: OpenAI-compatible chat completions endpoint
//! - [`DisabledAugmentor`]: always unavailable (AI pass turned off)
//! - [`FakeAugmentor`]: scripted responses for tests
//!
//! Callers must treat every error as "degrade to pattern-only results"; see
//! [`AiAnalysis::degraded`].

use crate::payload::Payload;
use crate::redact::redact_value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Contract types
// ============================================================================

/// Output of one augmentor pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    pub summary: String,
    #[serde(default)]
    pub insights: String,
    /// Free-form shell text, appended verbatim to the fix script
    #[serde(default)]
    pub additional_fixes: String,
    /// Titles of issues found beyond the catalog matches
    #[serde(default)]
    pub issues: Vec<String>,
    /// True when this is the fallback produced after a failed AI pass
    #[serde(default)]
    pub degraded: bool,
}

impl AiAnalysis {
    /// Safe default used whenever the augmentor fails or times out
    pub fn degraded(known_issue_count: usize) -> Self {
        Self {
            summary: format!(
                "Pattern matching found {} known issue(s); AI analysis unavailable.",
                known_issue_count
            ),
            insights: String::new(),
            additional_fixes: String::new(),
            issues: Vec::new(),
            degraded: true,
        }
    }

    pub fn has_additional_fixes(&self) -> bool {
        !self.additional_fixes.trim().is_empty()
    }
}

/// Augmentor errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AugmentError {
    #[error("AI analysis is disabled in configuration")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("AI provider returned empty response")]
    EmptyResponse,
}

/// Abstract "analyze" capability
#[async_trait]
pub trait Augmentor: Send + Sync {
    /// Analyze `payload`, skipping the issues in `known_ids`
    async fn analyze(&self, payload: &Payload, known_ids: &[String]) -> Result<AiAnalysis, AugmentError>;

    /// Short name for logs
    fn name(&self) -> &str;
}

// ============================================================================
// Configuration
// ============================================================================

/// AI augmentor configuration (`[ai]` section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentorConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Usually supplied through `CLAWMEDIC_AI_KEY` instead of the file
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound on one augmentor call, enforced by the caller
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Serialized payloads above this size are truncated before sending
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_payload_bytes() -> usize {
    48 * 1024
}

impl Default for AugmentorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

// ============================================================================
// Prompt and response handling
// ============================================================================

const SYSTEM_PROMPT: &str = "You diagnose OpenClaw agent gateway installations. \
You receive a redacted diagnostic snapshot and the ids of issues a rule engine already found. \
Report only problems NOT covered by those ids. Fixes must be idempotent bash that a human will \
review before running; never print secrets. Respond with a JSON object: \
{\"summary\": string, \"insights\": string, \"additionalFixes\": string, \"issues\": [string]}.";

/// Build the user prompt from a redacted, size-capped payload
pub fn build_prompt(payload: &Payload, known_ids: &[String], max_bytes: usize) -> String {
    let redacted = redact_value(payload.as_value());
    let mut snapshot = serde_json::to_string_pretty(&redacted).unwrap_or_default();
    if snapshot.len() > max_bytes {
        let mut cut = max_bytes;
        while !snapshot.is_char_boundary(cut) {
            cut -= 1;
        }
        snapshot.truncate(cut);
        snapshot.push_str("\n...[truncated]");
    }

    let known = if known_ids.is_empty() {
        "none".to_string()
    } else {
        known_ids.join(", ")
    };

    format!(
        "Already detected issue ids: {}\n\nDiagnostic snapshot:\n{}",
        known, snapshot
    )
}

/// Strip a surrounding markdown code fence, if any
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// String field that may come back as a string or a list of strings
fn flexible_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Parse the model's reply into an [`AiAnalysis`]
pub fn parse_analysis(text: &str) -> Result<AiAnalysis, AugmentError> {
    let body = strip_fence(text);
    if body.is_empty() {
        return Err(AugmentError::EmptyResponse);
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| AugmentError::InvalidResponse(format!("not valid JSON: {}", e)))?;
    let obj = json
        .as_object()
        .ok_or_else(|| AugmentError::InvalidResponse("expected a JSON object".to_string()))?;

    let summary = obj
        .get("summary")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AugmentError::InvalidResponse("missing 'summary'".to_string()))?
        .to_string();

    let issues = match obj.get("issues") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("title").and_then(|t| t.as_str()).map(String::from),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    };

    Ok(AiAnalysis {
        summary,
        insights: flexible_text(obj.get("insights")),
        additional_fixes: flexible_text(obj.get("additionalFixes")),
        issues,
        degraded: false,
    })
}

// ============================================================================
// HTTP augmentor (production)
// ============================================================================

/// Augmentor backed by an OpenAI-compatible chat completions API
pub struct HttpAugmentor {
    config: AugmentorConfig,
    client: reqwest::Client,
}

impl HttpAugmentor {
    pub fn new(config: AugmentorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl Augmentor for HttpAugmentor {
    async fn analyze(&self, payload: &Payload, known_ids: &[String]) -> Result<AiAnalysis, AugmentError> {
        if !self.config.enabled {
            return Err(AugmentError::Disabled);
        }

        let url = format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let user_prompt = build_prompt(payload, known_ids, self.config.max_payload_bytes);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AugmentError::Timeout(self.config.timeout_secs)
            } else {
                AugmentError::Http(format!("Request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(AugmentError::Http(format!(
                "HTTP {} from AI provider",
                response.status()
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AugmentError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let text = response_json
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .ok_or(AugmentError::EmptyResponse)?;

        debug!("AI provider returned {} bytes", text.len());
        parse_analysis(text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Disabled augmentor
// ============================================================================

/// Used when the AI pass is turned off; every call degrades immediately
pub struct DisabledAugmentor;

#[async_trait]
impl Augmentor for DisabledAugmentor {
    async fn analyze(&self, _payload: &Payload, _known_ids: &[String]) -> Result<AiAnalysis, AugmentError> {
        Err(AugmentError::Disabled)
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

// ============================================================================
// Fake augmentor (testing)
// ============================================================================

/// Scripted augmentor for deterministic tests
pub struct FakeAugmentor {
    responses: Mutex<Vec<Result<AiAnalysis, AugmentError>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeAugmentor {
    /// Responses are returned in order; the last one repeats
    pub fn new(responses: Vec<Result<AiAnalysis, AugmentError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(analysis: AiAnalysis) -> Self {
        Self::new(vec![Ok(analysis)])
    }

    pub fn always_error(error: AugmentError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Sleep before answering, to exercise caller timeouts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// `known_ids` received by each call
    pub fn received_ids(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Augmentor for FakeAugmentor {
    async fn analyze(&self, _payload: &Payload, known_ids: &[String]) -> Result<AiAnalysis, AugmentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(known_ids.to_vec());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| AugmentError::Http("fake augmentor poisoned".to_string()))?;
        match responses.len() {
            0 => Err(AugmentError::EmptyResponse),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}
