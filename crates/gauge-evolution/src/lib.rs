//! # gauge-evolution
//!
//! Pattern learning for Gauge calibration.
//!
//! This crate provides:
//! - Crash-safe pattern storage with a backup file
//! - Keyword extraction from oracle findings
//! - Gap analysis: pattern proposals, accuracy tracking and lifecycle changes

mod analyzer;
pub mod keywords;
mod store;

pub use analyzer::{iteration_metrics, GapAnalysis, GapAnalyzer};
pub use store::{builtin_patterns, PatternStore};
