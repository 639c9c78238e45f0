//! # gauge-orchestrator
//!
//! Drives the calibration loop for Gauge.
//!
//! Each iteration loads the artifact batch and pattern set, scores the batch
//! with the reference oracle and the cheap evaluator, analyzes the gap,
//! saves mutated patterns, writes the iteration log and decides whether to
//! continue. Sequencing is owned by a pure state machine; the engine only
//! performs the side effects.

mod activity_logger;
pub mod calibration;
pub mod convergence;
mod engine;
mod source;
pub mod state_machine;

pub use activity_logger::ActivityLogger;
pub use calibration::{finding_overlap, CalibrationController, Overlap};
pub use engine::{CalibrationLoop, LoopStatus, RunSummary};
pub use source::{validate_batch, ArtifactSource, JsonArtifactSource};
pub use state_machine::{transition, Action, Event, State};
