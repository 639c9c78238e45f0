//! Type definitions for oracle interactions

use async_trait::async_trait;
use gauge_core::config::OracleSettings;
use gauge_core::{Artifact, GaugeError, OracleFailureKind, Result, SCORE_MAX, SCORE_MIN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Claude model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    #[default]
    Opus,
    Sonnet,
    Haiku,
}

impl Model {
    /// Get the API model name
    pub fn api_name(&self) -> &'static str {
        match self {
            Model::Opus => "claude-opus-4-20250514",
            Model::Sonnet => "claude-sonnet-4-5-20250929",
            Model::Haiku => "claude-haiku-3-5-20250929",
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Opus => write!(f, "opus"),
            Model::Sonnet => write!(f, "sonnet"),
            Model::Haiku => write!(f, "haiku"),
        }
    }
}

impl std::str::FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opus" => Ok(Model::Opus),
            "sonnet" => Ok(Model::Sonnet),
            "haiku" => Ok(Model::Haiku),
            _ => Err(format!("Invalid model: {}. Use opus, sonnet, or haiku.", s)),
        }
    }
}

/// One oracle configuration (model plus request limits)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Name recorded in iteration logs and the calibration decision
    pub name: String,
    pub model: Model,
    pub max_tokens: usize,
}

impl OracleConfig {
    pub fn new(model: Model, max_tokens: usize) -> Self {
        Self {
            name: model.to_string(),
            model,
            max_tokens,
        }
    }

    /// Higher-capability configuration from settings
    pub fn primary(settings: &OracleSettings) -> Result<Self> {
        Self::from_model_name(&settings.primary_model, settings.max_tokens)
    }

    /// Cheaper configuration compared during calibration
    pub fn secondary(settings: &OracleSettings) -> Result<Self> {
        Self::from_model_name(&settings.secondary_model, settings.max_tokens)
    }

    fn from_model_name(name: &str, max_tokens: usize) -> Result<Self> {
        let model = name.parse::<Model>().map_err(GaugeError::Config)?;
        Ok(Self::new(model, max_tokens))
    }
}

/// Parsed oracle judgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
}

impl OracleVerdict {
    /// Reject verdicts whose score is outside the normalized range
    pub fn validate(self) -> std::result::Result<Self, OracleFailure> {
        if !self.score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&self.score) {
            return Err(OracleFailure::permanent(format!(
                "score {} outside [{}, {}]",
                self.score, SCORE_MIN, SCORE_MAX
            )));
        }
        Ok(self)
    }
}

/// A single failed oracle call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct OracleFailure {
    pub kind: OracleFailureKind,
    pub message: String,
    /// Minimum wait the server asked for before the next call
    pub retry_after: Option<Duration>,
}

impl OracleFailure {
    pub fn new(kind: OracleFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(OracleFailureKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OracleFailureKind::Timeout, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(OracleFailureKind::ServerError, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(OracleFailureKind::Permanent, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// External judge that scores one artifact per call
///
/// Implementations must not retry internally; retry policy belongs to the
/// expensive-mode evaluator.
#[async_trait]
pub trait ReferenceOracle: Send + Sync {
    async fn judge(
        &self,
        artifact: &Artifact,
        config: &OracleConfig,
    ) -> std::result::Result<OracleVerdict, OracleFailure>;
}

/// Anthropic API message format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

/// Anthropic API request format
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: usize,
    pub messages: Vec<AnthropicMessage>,
}

/// Anthropic API response format
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<AnthropicContent>,
    pub usage: Option<Usage>,
}

/// Content block in Anthropic response
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}
