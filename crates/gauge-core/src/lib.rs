//! # gauge-core
//!
//! Core types for the Gauge dual-mode evaluation system.
//!
//! Gauge calibrates a cheap, deterministic story evaluator against an
//! expensive reference oracle. The cheap side scores artifacts with fixed
//! heuristics plus a set of learned, human-readable patterns; the expensive
//! side asks an external judge. The gap between the two drives pattern
//! mutation until the cheap evaluator can stand on its own.
//!
//! ## Core Paradigm
//!
//! - Artifacts are read-only inputs supplied by an upstream pipeline
//! - Patterns are interpretable rules with an explicit lifecycle
//! - Every pattern mutation is a full load-modify-save cycle
//! - Iteration logs are the audit trail

pub mod config;
mod error;
pub mod fail_open;
mod signal;
mod types;

pub use config::GaugeConfig;
pub use error::{GaugeError, Result};
pub use signal::StopSignal;
pub use types::*;
