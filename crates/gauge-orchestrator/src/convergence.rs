//! Convergence decision after each iteration
//!
//! Pure function over the retained iteration logs. Guards apply in order:
//! the iteration limit wins, then the stability predicate (never before
//! `min_iterations`), then the plateau check.

use gauge_core::config::ConvergenceConfig;
use gauge_core::{ConvergenceCheck, ConvergenceOutcome, IterationLog};

/// Decide the outcome for `iteration`.
///
/// `logs` are in append order and must include the current iteration's log.
/// Incomplete (interrupted) logs are ignored.
pub fn check(config: &ConvergenceConfig, iteration: u32, logs: &[IterationLog]) -> ConvergenceCheck {
    if iteration >= config.max_iterations {
        return ConvergenceCheck {
            outcome: ConvergenceOutcome::MaxIterationsReached,
            reason: format!("reached max_iterations ({})", config.max_iterations),
        };
    }

    let complete: Vec<&IterationLog> = logs.iter().filter(|l| l.complete).collect();

    let unstable = match stability(config, &complete) {
        Ok(reason) if iteration >= config.min_iterations => {
            return ConvergenceCheck {
                outcome: ConvergenceOutcome::Converged,
                reason,
            };
        }
        Ok(reason) => {
            return ConvergenceCheck {
                outcome: ConvergenceOutcome::Continuing,
                reason: format!(
                    "{}, but iteration {} is below min_iterations ({})",
                    reason, iteration, config.min_iterations
                ),
            };
        }
        Err(reason) => reason,
    };

    if let Some(reason) = plateau(config, &complete) {
        return ConvergenceCheck {
            outcome: ConvergenceOutcome::PlateauReached,
            reason,
        };
    }

    ConvergenceCheck {
        outcome: ConvergenceOutcome::Continuing,
        reason: unstable,
    }
}

/// Stability predicate over the last two complete iterations.
///
/// `Ok` carries the reason it holds, `Err` the first reason it does not.
fn stability(config: &ConvergenceConfig, complete: &[&IterationLog]) -> Result<String, String> {
    let [previous, current] = match complete {
        [.., previous, current] => [*previous, *current],
        _ => return Err("fewer than two complete iterations".to_string()),
    };

    if previous.artifact_set() != current.artifact_set() {
        return Err("artifact batch changed between the last two iterations".to_string());
    }

    for log in [previous, current] {
        let m = &log.metrics;
        if m.mean_cheap < config.cheap_score_floor {
            return Err(format!(
                "iteration {} mean cheap score {:.2} below {:.2}",
                log.iteration, m.mean_cheap, config.cheap_score_floor
            ));
        }
        if m.mean_abs_gap > config.gap_ceiling {
            return Err(format!(
                "iteration {} mean absolute gap {:.2} above {:.2}",
                log.iteration, m.mean_abs_gap, config.gap_ceiling
            ));
        }
    }

    let churn = current
        .metrics
        .pattern_counts
        .active
        .abs_diff(previous.metrics.pattern_counts.active);
    if churn >= config.max_pattern_churn {
        return Err(format!(
            "active pattern count changed by {} (limit {})",
            churn, config.max_pattern_churn
        ));
    }

    Ok(format!(
        "iterations {} and {} stable: cheap {:.2}, gap {:.2}, churn {}",
        previous.iteration,
        current.iteration,
        current.metrics.mean_cheap,
        current.metrics.mean_abs_gap,
        churn
    ))
}

/// `plateau_window` consecutive complete iterations without improvement
fn plateau(config: &ConvergenceConfig, complete: &[&IterationLog]) -> Option<String> {
    let window = config.plateau_window;
    if window == 0 || complete.len() < window {
        return None;
    }

    let recent = &complete[complete.len() - window..];
    let stalled = recent.iter().all(|log| match log.metrics.gap_delta {
        Some(delta) => delta >= -config.min_improvement,
        None => false,
    });
    stalled.then(|| {
        format!(
            "mean absolute gap has not improved for {} iterations ({:.2})",
            window,
            recent[window - 1].metrics.mean_abs_gap
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gauge_core::{ComponentHealth, IterationMetrics, PatternCounts};

    fn log(iteration: u32, cheap: f64, abs_gap: f64, delta: Option<f64>, active: usize) -> IterationLog {
        IterationLog {
            iteration,
            complete: true,
            health: ComponentHealth::default(),
            metrics: IterationMetrics {
                iteration,
                timestamp: Utc::now(),
                mean_expensive: cheap + abs_gap,
                mean_cheap: cheap,
                mean_gap: abs_gap,
                mean_abs_gap: abs_gap,
                gap_delta: delta,
                pattern_counts: PatternCounts {
                    active,
                    ..PatternCounts::default()
                },
                scored: 3,
                sentinels: 0,
            },
            divergence: None,
            results: Vec::new(),
            mutations: Vec::new(),
            convergence: None,
            calibration: None,
            artifact_ids: vec!["s-1".into(), "s-2".into(), "s-3".into()],
        }
    }

    fn qualifying(iterations: std::ops::RangeInclusive<u32>) -> Vec<IterationLog> {
        iterations.map(|i| log(i, 4.3, 0.3, Some(-0.1), 4)).collect()
    }

    #[test]
    fn test_two_qualifying_iterations_converge_at_min() {
        let config = ConvergenceConfig::default();
        let logs = qualifying(2..=3);
        let result = check(&config, 3, &logs);
        assert_eq!(result.outcome, ConvergenceOutcome::Converged);
    }

    #[test]
    fn test_qualifying_before_min_continues() {
        let config = ConvergenceConfig::default();
        let logs = qualifying(1..=2);
        let result = check(&config, 2, &logs);
        assert_eq!(result.outcome, ConvergenceOutcome::Continuing);
        assert!(result.reason.contains("min_iterations"));
    }

    #[test]
    fn test_max_iterations_overrides_everything() {
        let config = ConvergenceConfig {
            max_iterations: 3,
            ..ConvergenceConfig::default()
        };
        let logs = qualifying(2..=3);
        assert_eq!(
            check(&config, 3, &logs).outcome,
            ConvergenceOutcome::MaxIterationsReached
        );
    }

    #[test]
    fn test_changed_artifact_set_blocks_convergence() {
        let config = ConvergenceConfig::default();
        let mut logs = qualifying(3..=4);
        logs[1].artifact_ids.push("s-4".into());
        assert_eq!(check(&config, 4, &logs).outcome, ConvergenceOutcome::Continuing);
    }

    #[test]
    fn test_pattern_churn_blocks_convergence() {
        let config = ConvergenceConfig::default();
        let logs = vec![log(3, 4.3, 0.3, Some(-0.1), 2), log(4, 4.3, 0.3, Some(-0.1), 12)];
        let result = check(&config, 4, &logs);
        assert_eq!(result.outcome, ConvergenceOutcome::Continuing);
        assert!(result.reason.contains("changed by 10"));
    }

    #[test]
    fn test_low_cheap_score_blocks_convergence() {
        let config = ConvergenceConfig::default();
        let logs = vec![log(3, 3.9, 0.3, None, 4), log(4, 4.3, 0.3, Some(0.0), 4)];
        assert_eq!(check(&config, 4, &logs).outcome, ConvergenceOutcome::Continuing);
    }

    #[test]
    fn test_incomplete_logs_are_ignored() {
        let config = ConvergenceConfig::default();
        let mut logs = qualifying(3..=5);
        logs[2].complete = false;
        logs[2].metrics.mean_abs_gap = 3.0;
        assert_eq!(check(&config, 5, &logs).outcome, ConvergenceOutcome::Converged);
    }

    #[test]
    fn test_plateau_after_five_stalled_iterations() {
        let config = ConvergenceConfig::default();
        let logs: Vec<IterationLog> = (1..=6)
            .map(|i| log(i, 3.0, 1.5, if i == 1 { None } else { Some(0.0) }, 4))
            .collect();
        assert_eq!(check(&config, 6, &logs).outcome, ConvergenceOutcome::PlateauReached);

        // One improving iteration in the window resets the plateau
        let mut improving = logs.clone();
        improving[3].metrics.gap_delta = Some(-0.2);
        assert_eq!(check(&config, 6, &improving).outcome, ConvergenceOutcome::Continuing);
    }

    #[test]
    fn test_convergence_monotonic_in_min_iterations() {
        let logs = qualifying(4..=6);
        let mut converged_at = Vec::new();
        for min in 0..=10 {
            let config = ConvergenceConfig {
                min_iterations: min,
                ..ConvergenceConfig::default()
            };
            converged_at.push(check(&config, 6, &logs).outcome == ConvergenceOutcome::Converged);
        }
        // Raising the floor can only turn Converged into Continuing, never back
        let first_blocked = converged_at.iter().position(|c| !c).unwrap_or(converged_at.len());
        assert!(converged_at[..first_blocked].iter().all(|c| *c));
        assert!(converged_at[first_blocked..].iter().all(|c| !c));
        assert_eq!(first_blocked, 7);
    }
}
