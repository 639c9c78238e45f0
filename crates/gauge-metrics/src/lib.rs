//! Iteration history for Gauge
//!
//! Every completed (or interrupted) iteration is appended as one JSON line.
//! The file is bounded; compaction always keeps the first entry so the
//! baseline survives.

mod history;

pub use history::{HistorySummary, IterationHistory};
