//! Activity Logger - human-readable run log in `.gauge/activity.md`
//!
//! Every write is fail-open: a broken activity log never stops a run.

use chrono::Utc;
use gauge_core::fail_open::fail_open;
use gauge_core::{CalibrationDecision, IterationLog, PatternMutation, Result};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Mutations listed per iteration before the rest are summarized
const MAX_LISTED_MUTATIONS: usize = 10;

/// Activity logger for calibration runs
pub struct ActivityLogger {
    output_path: PathBuf,
}

impl ActivityLogger {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// Log the start of a run
    pub async fn log_run_start(&self, first_iteration: u32, max_iterations: u32) {
        fail_open("activity_logger::log_run_start", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "## Run started {}\n**From iteration**: {}\n**Max iterations**: {}\n\n",
                timestamp, first_iteration, max_iterations
            );
            self.append_internal(&content).await
        })
        .await;
    }

    /// Log one iteration (complete or interrupted)
    pub async fn log_iteration(&self, log: &IterationLog) {
        fail_open("activity_logger::log_iteration", || async {
            let content = render_iteration(log);
            self.append_internal(&content).await
        })
        .await;
    }

    pub async fn log_calibration(&self, decision: &CalibrationDecision) {
        fail_open("activity_logger::log_calibration", || async {
            let content = format!(
                "**Calibration decided**: adopted `{}` ({:?}); overlap {:.0}% of {} findings (threshold {:.0}%)\n\n",
                decision.adopted_config,
                decision.adopted,
                decision.overlap_rate * 100.0,
                decision.primary_findings,
                decision.threshold * 100.0
            );
            self.append_internal(&content).await
        })
        .await;
    }

    /// Log why the run halted
    pub async fn log_halt(&self, state: &str, detail: &str) {
        fail_open("activity_logger::log_halt", || async {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let content = format!(
                "## Run halted: {}\n**Time**: {}\n{}\n\n---\n\n",
                state, timestamp, detail
            );
            self.append_internal(&content).await
        })
        .await;
    }

    async fn append_internal(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn render_iteration(log: &IterationLog) -> String {
    let m = &log.metrics;
    let mut content = format!(
        "### Iteration {}{}\n**Time**: {}\n**Oracle**: {} (failure rate {:.0}%)\n\n",
        log.iteration,
        if log.complete { "" } else { " (interrupted)" },
        m.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        log.health.oracle_config,
        log.health.oracle_failure_rate * 100.0
    );

    content.push_str(&format!(
        "| expensive | cheap | gap | abs gap | scored | sentinels |\n\
         |---|---|---|---|---|---|\n\
         | {:.2} | {:.2} | {:+.2} | {:.2} | {} | {} |\n\n",
        m.mean_expensive, m.mean_cheap, m.mean_gap, m.mean_abs_gap, m.scored, m.sentinels
    ));

    let counts = &m.pattern_counts;
    content.push_str(&format!(
        "**Patterns**: {} active, {} provisional, {} rejected, {} pruned\n\n",
        counts.active, counts.provisional, counts.rejected, counts.pruned
    ));

    if !log.mutations.is_empty() {
        content.push_str("**Mutations**:\n");
        for mutation in log.mutations.iter().take(MAX_LISTED_MUTATIONS) {
            content.push_str(&format!("- {}\n", describe(mutation)));
        }
        if log.mutations.len() > MAX_LISTED_MUTATIONS {
            content.push_str(&format!(
                "- ... and {} more\n",
                log.mutations.len() - MAX_LISTED_MUTATIONS
            ));
        }
        content.push('\n');
    }

    if let Some(check) = &log.convergence {
        content.push_str(&format!(
            "**Convergence**: {} ({})\n\n",
            check.outcome, check.reason
        ));
    }
    content
}

fn describe(mutation: &PatternMutation) -> String {
    match mutation {
        PatternMutation::Proposed {
            pattern_id,
            polarity,
            keywords,
            artifact_id,
        } => format!(
            "proposed {} pattern `{}` [{}] from {}",
            polarity,
            pattern_id,
            keywords.join(", "),
            artifact_id
        ),
        PatternMutation::Promoted { pattern_id } => format!("promoted `{}`", pattern_id),
        PatternMutation::Rejected { pattern_id, reason } => {
            format!("rejected `{}`: {}", pattern_id, reason)
        }
        PatternMutation::Pruned {
            pattern_id,
            idle_iterations,
        } => format!("pruned `{}` after {} idle iterations", pattern_id, idle_iterations),
        PatternMutation::AccuracyAdjusted {
            pattern_id,
            from,
            to,
        } => format!("accuracy of `{}`: {:.2} -> {:.2}", pattern_id, from, to),
    }
}
