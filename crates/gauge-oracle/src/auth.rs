//! Authentication for the Anthropic API
//!
//! Supports two authentication methods:
//! 1. Claude Code OAuth token (CLAUDE_CODE_OAUTH_TOKEN)
//! 2. An API key read from the configured variable (ANTHROPIC_API_KEY by default)

use gauge_core::{GaugeError, Result};
use std::env;

const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Get authentication token for the Anthropic API
///
/// The OAuth token wins when both are set.
pub fn get_auth_token(api_key_env: &str) -> Result<String> {
    if let Ok(oauth_token) = env::var(OAUTH_TOKEN_ENV) {
        if !oauth_token.trim().is_empty() {
            tracing::info!("Using Claude Code OAuth token");
            return Ok(oauth_token);
        }
    }

    if let Ok(api_key) = env::var(api_key_env) {
        if !api_key.trim().is_empty() {
            tracing::info!("Using {}", api_key_env);
            return Ok(api_key);
        }
    }

    Err(GaugeError::Auth(format!(
        "No authentication found. Set either:\n\
         - {}=sk-ant-oat01-... (for subscription access)\n\
         - {}=sk-ant-api03-... (for API access)",
        OAUTH_TOKEN_ENV, api_key_env
    )))
}
