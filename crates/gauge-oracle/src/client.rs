//! Anthropic API client acting as the reference oracle
//!
//! Each judgment is a fresh, stateless request. The client classifies
//! failures but never retries; see `ExpensiveModeEvaluator`.

use async_trait::async_trait;
use gauge_core::config::OracleSettings;
use gauge_core::{Artifact, GaugeError, Result};
use std::time::Duration;
use tracing::instrument;

use crate::auth;
use crate::prompt::{build_prompt, parse_verdict};
use crate::types::{
    AnthropicMessage, AnthropicRequest, AnthropicResponse, OracleConfig, OracleFailure,
    OracleVerdict, ReferenceOracle,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Reference oracle backed by the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct AnthropicOracle {
    http: reqwest::Client,
    auth_token: String,
    api_url: String,
}

impl AnthropicOracle {
    /// Build a client from settings, reading the API key from the environment
    pub fn from_settings(settings: &OracleSettings) -> Result<Self> {
        let auth_token = auth::get_auth_token(&settings.api_key_env)?;
        Self::new(auth_token, Duration::from_secs(settings.request_timeout_secs))
    }

    pub fn new(auth_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GaugeError::Oracle(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            auth_token: auth_token.into(),
            api_url: ANTHROPIC_API_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (proxies, test servers)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

/// Seconds from a `retry-after` header; HTTP-date values are ignored
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Map an HTTP status to a failure kind
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> OracleFailure {
    let message = format!("Anthropic API error {}: {}", status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        OracleFailure::rate_limited(message)
    } else if status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
    {
        OracleFailure::timeout(message)
    } else if status.is_server_error() {
        OracleFailure::server_error(message)
    } else {
        OracleFailure::permanent(message)
    }
}

fn classify_transport(error: &reqwest::Error) -> OracleFailure {
    if error.is_timeout() {
        OracleFailure::timeout(format!("request timed out: {}", error))
    } else if error.is_connect() || error.is_request() {
        OracleFailure::server_error(format!("failed to send request: {}", error))
    } else {
        OracleFailure::permanent(format!("request failed: {}", error))
    }
}

#[async_trait]
impl ReferenceOracle for AnthropicOracle {
    #[instrument(skip_all, fields(artifact = %artifact.id, oracle = %config.name))]
    async fn judge(
        &self,
        artifact: &Artifact,
        config: &OracleConfig,
    ) -> std::result::Result<OracleVerdict, OracleFailure> {
        let request = AnthropicRequest {
            model: config.model.api_name().to_string(),
            max_tokens: config.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: build_prompt(artifact),
            }],
        };

        tracing::debug!("Sending judgment request to Anthropic API");

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.auth_token)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let hint = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retry_after(response.headers())
            } else {
                None
            };
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            let failure = classify_status(status, &error_text);
            return Err(match hint {
                Some(delay) => failure.with_retry_after(delay),
                None => failure,
            });
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| OracleFailure::permanent(format!("Failed to parse response: {}", e)))?;

        let text: String = anthropic_response
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Err(OracleFailure::permanent("No text content in response"));
        }

        if let Some(usage) = &anthropic_response.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Judgment received"
            );
        }

        parse_verdict(&text)
    }
}
