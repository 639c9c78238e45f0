//! Expensive-mode evaluator
//!
//! Calls the reference oracle once per artifact, strictly in sequence.
//! Transient failures are retried with backoff; anything left unscored is
//! recorded as a sentinel so the batch can still complete.

use gauge_core::{Artifact, ExpensiveModeResult, GaugeError, Result, StopSignal};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::retry::BackoffPolicy;
use crate::types::{OracleConfig, ReferenceOracle};

/// Results of one expensive batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// One result per evaluated artifact, in input order
    pub results: Vec<ExpensiveModeResult>,
    /// True when a stop request cut the batch short
    pub interrupted: bool,
    /// Retries spent across the batch
    pub retries: u32,
}

impl BatchOutcome {
    pub fn sentinel_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_sentinel()).count()
    }

    /// Fraction of sentinel results (0.0 for an empty batch)
    pub fn failure_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.sentinel_count() as f64 / self.results.len() as f64
        }
    }
}

/// Scores artifacts with the reference oracle
#[derive(Clone)]
pub struct ExpensiveModeEvaluator {
    oracle: Arc<dyn ReferenceOracle>,
    policy: BackoffPolicy,
    failure_ceiling: f64,
}

impl ExpensiveModeEvaluator {
    pub fn new(oracle: Arc<dyn ReferenceOracle>, policy: BackoffPolicy, failure_ceiling: f64) -> Self {
        Self {
            oracle,
            policy,
            failure_ceiling,
        }
    }

    /// Evaluate a batch under one oracle configuration.
    ///
    /// The stop signal is checked before each artifact; an in-flight call is
    /// always allowed to finish. A complete batch whose sentinel fraction
    /// exceeds the failure ceiling is rejected with `EvaluationUnreliable`.
    pub async fn evaluate_batch(
        &self,
        artifacts: &[Artifact],
        config: &OracleConfig,
        stop: &StopSignal,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(artifacts.len()),
            interrupted: false,
            retries: 0,
        };

        for artifact in artifacts {
            if stop.is_stopped() {
                info!(
                    "Stop requested; expensive batch interrupted after {} of {} artifacts",
                    outcome.results.len(),
                    artifacts.len()
                );
                outcome.interrupted = true;
                break;
            }
            let result = self.evaluate_one(artifact, config).await;
            outcome.retries += result.attempts.saturating_sub(1);
            outcome.results.push(result);
        }

        let failed = outcome.sentinel_count();
        if !outcome.interrupted && outcome.failure_rate() > self.failure_ceiling {
            warn!(
                "Expensive batch unreliable: {} of {} artifacts failed",
                failed,
                outcome.results.len()
            );
            return Err(GaugeError::EvaluationUnreliable {
                failed,
                total: outcome.results.len(),
                ceiling: self.failure_ceiling,
            });
        }

        info!(
            oracle = %config.name,
            scored = outcome.results.len() - failed,
            sentinels = failed,
            retries = outcome.retries,
            "Expensive batch complete"
        );
        Ok(outcome)
    }

    async fn evaluate_one(&self, artifact: &Artifact, config: &OracleConfig) -> ExpensiveModeResult {
        let mut attempts = 0u32;
        let mut slept = Duration::ZERO;

        loop {
            attempts += 1;
            let failure = match self.oracle.judge(artifact, config).await {
                Ok(verdict) => match verdict.validate() {
                    Ok(verdict) => {
                        return ExpensiveModeResult {
                            artifact_id: artifact.id.clone(),
                            score: verdict.score,
                            reasoning: verdict.reasoning,
                            strengths: verdict.strengths,
                            weaknesses: verdict.weaknesses,
                            failure: None,
                            attempts,
                        }
                    }
                    Err(failure) => failure,
                },
                Err(failure) => failure,
            };

            if !failure.is_transient() {
                warn!("Oracle failed permanently on {}: {}", artifact.id, failure);
                return ExpensiveModeResult::sentinel(&artifact.id, failure.kind, attempts);
            }

            let Some(delay) = self
                .policy
                .next_delay_after(attempts, slept, failure.retry_after)
            else {
                warn!(
                    "Oracle retries exhausted on {} after {} attempts: {}",
                    artifact.id, attempts, failure
                );
                return ExpensiveModeResult::sentinel(&artifact.id, failure.kind, attempts);
            };

            warn!(
                "Oracle {} on {}. Waiting {:?} before retry {}/{}",
                failure.kind, artifact.id, delay, attempts, self.policy.max_retries
            );
            tokio::time::sleep(delay).await;
            slept += delay;
        }
    }
}
