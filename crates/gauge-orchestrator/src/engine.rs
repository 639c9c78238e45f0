//! Calibration Loop - drives the state machine and performs its side effects
//!
//! Each iteration reads all state fresh from disk:
//! - Pattern set from the pattern store
//! - Artifact batch from the artifact source
//! - Previous metrics from the iteration history
//!
//! Nothing carries over in memory between iterations except the calibration
//! controller, which persists its own progress.

use crate::activity_logger::ActivityLogger;
use crate::calibration::CalibrationController;
use crate::convergence;
use crate::source::{validate_batch, ArtifactSource};
use crate::state_machine::{transition, Action, Event, State};
use gauge_core::{
    Artifact, CalibrationDecision, CheapModeResult, ComponentHealth, ConvergenceCheck,
    DualModeResult, ExpensiveModeResult, GaugeConfig, GaugeError, HealthStatus, IterationLog,
    Pattern, PatternCounts, Result, StopSignal,
};
use gauge_evolution::{iteration_metrics, GapAnalyzer, PatternStore};
use gauge_metrics::IterationHistory;
use gauge_oracle::{BackoffPolicy, BatchOutcome, ExpensiveModeEvaluator, OracleConfig, ReferenceOracle};
use gauge_validation::CheapModeEvaluator;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of `CalibrationLoop::run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations completed during this run
    pub iterations: Vec<u32>,
    pub final_state: State,
}

/// Snapshot for `gauge status`, read from disk without an oracle
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub next_iteration: u32,
    pub last_iteration: Option<u32>,
    pub last_complete: Option<bool>,
    pub convergence: Option<ConvergenceCheck>,
    pub calibration: Option<CalibrationDecision>,
    pub standing_oracle: String,
    pub pattern_counts: PatternCounts,
}

impl LoopStatus {
    pub async fn collect(config: &GaugeConfig) -> Result<Self> {
        let storage = &config.storage;
        let history = IterationHistory::new(storage.history_path(), storage.history_limit);
        let latest = history.latest().await?;
        let patterns = PatternStore::new(storage.patterns_path()).load().await?;
        let calibration = CalibrationController::load(
            config.calibration.clone(),
            storage.calibration_path(),
            OracleConfig::primary(&config.oracle)?,
            OracleConfig::secondary(&config.oracle)?,
        )
        .await?;

        Ok(Self {
            next_iteration: latest.as_ref().map(|l| l.iteration + 1).unwrap_or(1),
            last_iteration: latest.as_ref().map(|l| l.iteration),
            last_complete: latest.as_ref().map(|l| l.complete),
            convergence: latest.as_ref().and_then(|l| l.convergence.clone()),
            calibration: calibration.decision().cloned(),
            standing_oracle: calibration.standing_config().name.clone(),
            pattern_counts: PatternCounts::from_patterns(&patterns),
        })
    }
}

/// Expensive phase output for one iteration
struct ExpensivePhase {
    outcome: BatchOutcome,
    oracle_config: String,
    decision: Option<CalibrationDecision>,
}

/// Runs calibration iterations until a terminal state
pub struct CalibrationLoop {
    config: GaugeConfig,
    source: Arc<dyn ArtifactSource>,
    store: PatternStore,
    history: IterationHistory,
    cheap: CheapModeEvaluator,
    expensive: ExpensiveModeEvaluator,
    analyzer: GapAnalyzer,
    calibration: CalibrationController,
    activity: ActivityLogger,
    stop: StopSignal,
    state: State,
}

impl CalibrationLoop {
    /// Open a loop over the state directory named in `config.storage`
    pub async fn open(
        config: GaugeConfig,
        source: Arc<dyn ArtifactSource>,
        oracle: Arc<dyn ReferenceOracle>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = &config.storage;
        let calibration = CalibrationController::load(
            config.calibration.clone(),
            storage.calibration_path(),
            OracleConfig::primary(&config.oracle)?,
            OracleConfig::secondary(&config.oracle)?,
        )
        .await?;

        Ok(Self {
            source,
            store: PatternStore::new(storage.patterns_path()),
            history: IterationHistory::new(storage.history_path(), storage.history_limit),
            cheap: CheapModeEvaluator::new(config.heuristics.clone()),
            expensive: ExpensiveModeEvaluator::new(
                oracle,
                BackoffPolicy::from_settings(&config.oracle),
                config.oracle.failure_ceiling,
            ),
            analyzer: GapAnalyzer::new(config.analysis.clone()),
            calibration,
            activity: ActivityLogger::new(storage.activity_path()),
            stop: StopSignal::new(),
            state: State::Idle,
            config,
        })
    }

    /// Share an externally owned stop signal (e.g. a Ctrl-C handler)
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Iterate until converged, plateaued, out of iterations, stopped or failed
    pub async fn run(&mut self) -> Result<RunSummary> {
        let first = self.history.next_iteration().await?;
        info!(
            "Starting calibration loop at iteration {} (max {})",
            first, self.config.convergence.max_iterations
        );
        self.activity
            .log_run_start(first, self.config.convergence.max_iterations)
            .await;

        let mut completed = Vec::new();
        loop {
            if self.stop.is_stopped() {
                self.fire(Event::StopRequested)?;
                self.activity
                    .log_halt(self.state.name(), "Stop requested between iterations")
                    .await;
                break;
            }

            if let Some(log) = self.run_iteration().await? {
                if log.complete {
                    completed.push(log.iteration);
                }
            }
            if self.state.is_terminal() {
                break;
            }
        }

        info!("Calibration loop finished: {}", self.state.name());
        Ok(RunSummary {
            iterations: completed,
            final_state: self.state.clone(),
        })
    }

    /// Run a single iteration.
    ///
    /// Returns `None` when the iteration limit was already reached. An
    /// iteration interrupted by a stop request returns its incomplete log.
    pub async fn run_iteration(&mut self) -> Result<Option<IterationLog>> {
        let result = self.step().await;
        match result {
            Ok(log) => Ok(log),
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn step(&mut self) -> Result<Option<IterationLog>> {
        let iteration = self.history.next_iteration().await?;
        let max_iterations = self.config.convergence.max_iterations;
        if iteration > max_iterations {
            self.fire(Event::LimitReached {
                iteration: iteration - 1,
            })?;
            self.activity
                .log_halt(
                    self.state.name(),
                    &format!("max_iterations ({}) already reached", max_iterations),
                )
                .await;
            return Ok(None);
        }
        self.fire(Event::StartIteration { iteration })?;

        let patterns = self.store.load().await?;
        let artifacts = self.source.load_batch().await?;
        validate_batch(&artifacts)?;
        self.fire(Event::ArtifactsLoaded {
            count: artifacts.len(),
        })?;

        let phase = self.evaluate_expensive(iteration, &artifacts).await?;
        let health = ComponentHealth {
            pattern_store: HealthStatus::Healthy,
            oracle: oracle_health(&phase.outcome),
            oracle_failure_rate: phase.outcome.failure_rate(),
            oracle_config: phase.oracle_config.clone(),
        };
        if phase.outcome.interrupted {
            let log = self
                .interrupt(iteration, &artifacts, &patterns, phase, health)
                .await?;
            return Ok(Some(log));
        }
        self.fire(Event::ExpensiveComplete {
            sentinels: phase.outcome.sentinel_count(),
        })?;

        let cheap = self.cheap.evaluate_batch(&artifacts, &patterns);
        let results = pair_results(cheap, phase.outcome.results)?;
        self.fire(Event::CheapComplete)?;

        let mut logs = self.history.load_all().await?;
        let previous = logs.iter().rev().find(|l| l.complete).map(|l| &l.metrics);
        let analysis = self.analyzer.analyze(iteration, results, &patterns, previous);
        let patterns_changed = analysis.patterns != patterns;
        let actions = self.fire(Event::AnalysisComplete {
            mutations: analysis.mutations.len(),
            patterns_changed,
        })?;
        if actions.contains(&Action::SavePatterns) {
            self.store.save(&analysis.patterns).await?;
            self.fire(Event::PatternsSaved)?;
        }

        let mut log = IterationLog {
            iteration,
            complete: true,
            health,
            metrics: analysis.metrics,
            divergence: Some(analysis.divergence),
            results: analysis.results,
            mutations: analysis.mutations,
            convergence: None,
            calibration: phase.decision,
            artifact_ids: sorted_ids(&artifacts),
        };
        logs.push(log.clone());
        let check = convergence::check(&self.config.convergence, iteration, &logs);
        log.convergence = Some(check.clone());

        self.history.append(&log).await?;
        self.fire(Event::LogWritten)?;
        self.activity.log_iteration(&log).await;
        if let Some(decision) = &log.calibration {
            self.activity.log_calibration(decision).await;
        }

        self.fire(Event::ConvergenceChecked {
            outcome: check.outcome,
        })?;
        if self.state.is_terminal() {
            self.activity.log_halt(self.state.name(), &check.reason).await;
        }
        Ok(Some(log))
    }

    /// Score the batch with the standing oracle, retrying unreliable batches.
    ///
    /// While calibrating, the secondary configuration judges the same batch
    /// afterwards; only the standing results feed gap analysis.
    async fn evaluate_expensive(
        &mut self,
        iteration: u32,
        artifacts: &[Artifact],
    ) -> Result<ExpensivePhase> {
        let mut attempt = 1;
        let outcome = loop {
            let standing = self.calibration.standing_config().clone();
            let result = self
                .expensive
                .evaluate_batch(artifacts, &standing, &self.stop)
                .await;
            match result {
                Ok(outcome) => break outcome,
                Err(GaugeError::EvaluationUnreliable { failed, total, .. })
                    if attempt <= self.config.convergence.max_batch_retries =>
                {
                    warn!(
                        iteration,
                        attempt, "Discarding unreliable oracle batch ({} of {} failed)", failed, total
                    );
                    self.fire(Event::ExpensiveUnreliable { failed, total })?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let oracle_config = self.calibration.standing_config().name.clone();
        let decision = if !outcome.interrupted && self.calibration.is_calibrating() {
            self.calibrate(iteration, artifacts, &outcome.results).await?
        } else {
            None
        };

        Ok(ExpensivePhase {
            outcome,
            oracle_config,
            decision,
        })
    }

    async fn calibrate(
        &mut self,
        iteration: u32,
        artifacts: &[Artifact],
        primary: &[ExpensiveModeResult],
    ) -> Result<Option<CalibrationDecision>> {
        let secondary = self.calibration.secondary().clone();
        info!(iteration, "Calibration: scoring batch with {}", secondary.name);

        let result = self
            .expensive
            .evaluate_batch(artifacts, &secondary, &self.stop)
            .await;
        match result {
            Ok(outcome) if outcome.interrupted => {
                info!("Secondary batch interrupted; calibration skipped for iteration {}", iteration);
                Ok(None)
            }
            Ok(outcome) => {
                self.calibration
                    .record(iteration, primary, &outcome.results)
                    .await
            }
            Err(GaugeError::EvaluationUnreliable { failed, total, .. }) => {
                warn!(
                    "Secondary batch unreliable ({} of {} failed); calibration skipped for iteration {}",
                    failed, total, iteration
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist what exists of an iteration cut short by a stop request
    async fn interrupt(
        &mut self,
        iteration: u32,
        artifacts: &[Artifact],
        patterns: &[Pattern],
        phase: ExpensivePhase,
        health: ComponentHealth,
    ) -> Result<IterationLog> {
        let actions = self.fire(Event::StopRequested)?;

        let evaluated = &artifacts[..phase.outcome.results.len()];
        let cheap = self.cheap.evaluate_batch(evaluated, patterns);
        let results = pair_results(cheap, phase.outcome.results)?;
        let previous = self
            .history
            .load_all()
            .await?
            .into_iter()
            .rev()
            .find(|l| l.complete)
            .map(|l| l.metrics);

        let log = IterationLog {
            iteration,
            complete: false,
            health,
            metrics: iteration_metrics(iteration, &results, patterns, previous.as_ref()),
            divergence: None,
            results,
            mutations: Vec::new(),
            convergence: None,
            calibration: None,
            artifact_ids: sorted_ids(artifacts),
        };

        if actions.contains(&Action::WriteLog { complete: false }) {
            self.history.append(&log).await?;
            self.activity.log_iteration(&log).await;
        }
        self.activity
            .log_halt(
                self.state.name(),
                &format!(
                    "Stop requested during iteration {} after {} of {} artifacts",
                    iteration,
                    log.results.len(),
                    artifacts.len()
                ),
            )
            .await;
        Ok(log)
    }

    /// Apply an event; an unexpected `Failed` state becomes an error
    fn fire(&mut self, event: Event) -> Result<Vec<Action>> {
        let is_error = matches!(event, Event::Error { .. });
        let current = std::mem::replace(&mut self.state, State::Idle);
        let (next, actions) = transition(current, event);

        for action in &actions {
            if let Action::LogActivity { message } = action {
                info!("{}", message);
            }
        }
        debug!(state = next.name(), "Loop transition");

        let invalid = match &next {
            State::Failed { error } if !is_error => Some(error.clone()),
            _ => None,
        };
        self.state = next;
        match invalid {
            Some(error) => Err(GaugeError::InvalidTransition(error)),
            None => Ok(actions),
        }
    }

    /// Move to `Failed` on fatal errors.
    ///
    /// An unreliable batch leaves the state in `EvaluatingExpensive`, from
    /// which the same iteration may be started again.
    async fn fail(&mut self, err: GaugeError) -> GaugeError {
        if err.is_fatal() && !self.state.is_terminal() {
            let message = err.to_string();
            // An Error event is accepted from every non-terminal state
            let _ = self.fire(Event::Error {
                message: message.clone(),
            });
            self.activity.log_halt(self.state.name(), &message).await;
        } else if !err.is_fatal() {
            warn!("Iteration abandoned without a log: {}", err);
        }
        err
    }
}

fn pair_results(
    cheap: Vec<CheapModeResult>,
    expensive: Vec<ExpensiveModeResult>,
) -> Result<Vec<DualModeResult>> {
    cheap
        .into_iter()
        .zip(expensive)
        .map(|(c, e)| DualModeResult::pair(c, e))
        .collect()
}

fn sorted_ids(artifacts: &[Artifact]) -> Vec<String> {
    let mut ids: Vec<String> = artifacts.iter().map(|a| a.id.clone()).collect();
    ids.sort();
    ids
}

fn oracle_health(outcome: &BatchOutcome) -> HealthStatus {
    let rate = outcome.failure_rate();
    if rate == 0.0 {
        HealthStatus::Healthy
    } else if rate >= 1.0 {
        HealthStatus::Unavailable
    } else {
        HealthStatus::Degraded
    }
}
