//! Expensive-mode evaluation for Gauge
//!
//! The reference oracle is an external judge reached over HTTP. Every call
//! can fail; failures are typed values that the expensive-mode evaluator
//! retries with bounded backoff or records as sentinel results.

pub mod auth;
mod client;
mod expensive;
pub mod prompt;
mod retry;
mod types;

pub use client::AnthropicOracle;
pub use expensive::{BatchOutcome, ExpensiveModeEvaluator};
pub use retry::BackoffPolicy;
pub use types::*;
