//! Cheap-mode evaluation for Gauge
//!
//! Scores artifacts locally from six bounded heuristics plus the learned
//! pattern set. Evaluation is pure: no I/O and no mutation of its inputs.

mod cheap;
pub mod heuristics;

pub use cheap::CheapModeEvaluator;
