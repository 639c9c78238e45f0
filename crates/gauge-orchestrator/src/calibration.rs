//! Calibration between the primary and secondary oracle configurations
//!
//! For the first `window` iterations both configurations judge the batch.
//! Findings overlap is accumulated; once the window closes the standing
//! oracle is chosen exactly once and persisted to `calibration.json`.

use chrono::Utc;
use gauge_core::config::CalibrationConfig;
use gauge_core::{CalibrationDecision, ExpensiveModeResult, GaugeError, OracleRole, Result};
use gauge_evolution::keywords::significant_keywords;
use gauge_oracle::OracleConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Persisted calibration progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CalibrationFile {
    observed_iterations: u32,
    primary_findings: usize,
    matched_findings: usize,
    decision: Option<CalibrationDecision>,
}

/// Findings overlap for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overlap {
    pub primary_findings: usize,
    pub matched_findings: usize,
}

impl Overlap {
    /// Fraction of primary findings the secondary also produced.
    ///
    /// Zero findings give 0.0 so an empty window never demotes the primary.
    pub fn rate(&self) -> f64 {
        if self.primary_findings == 0 {
            0.0
        } else {
            self.matched_findings as f64 / self.primary_findings as f64
        }
    }
}

/// Chooses the standing oracle configuration
pub struct CalibrationController {
    config: CalibrationConfig,
    path: PathBuf,
    primary: OracleConfig,
    secondary: OracleConfig,
    state: CalibrationFile,
}

impl CalibrationController {
    /// Load progress from `path`; a missing file starts a fresh window
    pub async fn load(
        config: CalibrationConfig,
        path: impl Into<PathBuf>,
        primary: OracleConfig,
        secondary: OracleConfig,
    ) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            serde_json::from_str(&content).map_err(|e| {
                GaugeError::Config(format!("calibration file {:?} is unreadable: {}", path, e))
            })?
        } else {
            CalibrationFile::default()
        };
        Ok(Self {
            config,
            path,
            primary,
            secondary,
            state,
        })
    }

    pub fn decision(&self) -> Option<&CalibrationDecision> {
        self.state.decision.as_ref()
    }

    /// Whether both configurations must judge the next batch
    pub fn is_calibrating(&self) -> bool {
        self.state.decision.is_none() && self.config.window > 0
    }

    pub fn primary(&self) -> &OracleConfig {
        &self.primary
    }

    pub fn secondary(&self) -> &OracleConfig {
        &self.secondary
    }

    /// Configuration whose results feed gap analysis
    pub fn standing_config(&self) -> &OracleConfig {
        match self.state.decision.as_ref().map(|d| d.adopted) {
            Some(OracleRole::Secondary) => &self.secondary,
            _ => &self.primary,
        }
    }

    /// Record one iteration of paired batches.
    ///
    /// Returns the decision when this iteration closes the window. Once a
    /// decision exists further calls are ignored until `reset`.
    pub async fn record(
        &mut self,
        iteration: u32,
        primary: &[ExpensiveModeResult],
        secondary: &[ExpensiveModeResult],
    ) -> Result<Option<CalibrationDecision>> {
        if !self.is_calibrating() {
            return Ok(None);
        }

        let overlap = finding_overlap(primary, secondary, self.config.finding_match_ratio);
        self.state.observed_iterations += 1;
        self.state.primary_findings += overlap.primary_findings;
        self.state.matched_findings += overlap.matched_findings;
        debug!(
            iteration,
            primary_findings = overlap.primary_findings,
            matched = overlap.matched_findings,
            "Calibration overlap recorded"
        );

        let decision = if self.state.observed_iterations >= self.config.window {
            let total = Overlap {
                primary_findings: self.state.primary_findings,
                matched_findings: self.state.matched_findings,
            };
            let overlap_rate = total.rate();
            let adopted = if overlap_rate >= self.config.overlap_threshold {
                OracleRole::Secondary
            } else {
                OracleRole::Primary
            };
            let adopted_config = match adopted {
                OracleRole::Primary => self.primary.name.clone(),
                OracleRole::Secondary => self.secondary.name.clone(),
            };
            info!(
                "Calibration decided at iteration {}: adopting {} (overlap {:.2})",
                iteration, adopted_config, overlap_rate
            );
            Some(CalibrationDecision {
                adopted,
                adopted_config,
                overlap_rate,
                threshold: self.config.overlap_threshold,
                primary_findings: total.primary_findings,
                matched_findings: total.matched_findings,
                decided_iteration: iteration,
                decided_at: Utc::now(),
            })
        } else {
            None
        };

        self.state.decision = decision.clone();
        self.persist().await?;
        Ok(decision)
    }

    /// Reopen calibration: forget progress and any decision
    pub async fn reset(&mut self) -> Result<()> {
        self.state = CalibrationFile::default();
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
        }
        info!("Calibration reset");
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn findings(result: &ExpensiveModeResult) -> impl Iterator<Item = &String> {
    result.strengths.iter().chain(result.weaknesses.iter())
}

/// Count primary findings that the secondary reproduced for the same artifact.
///
/// A finding matches when at least `ratio` of its significant keywords appear
/// in a single secondary finding. Findings with no significant keywords and
/// sentinel primary results are not counted.
pub fn finding_overlap(
    primary: &[ExpensiveModeResult],
    secondary: &[ExpensiveModeResult],
    ratio: f64,
) -> Overlap {
    let secondary_by_id: HashMap<&str, Vec<BTreeSet<String>>> = secondary
        .iter()
        .filter(|r| !r.is_sentinel())
        .map(|r| {
            (
                r.artifact_id.as_str(),
                findings(r).map(|f| significant_keywords(f)).collect(),
            )
        })
        .collect();

    let mut overlap = Overlap::default();
    for result in primary.iter().filter(|r| !r.is_sentinel()) {
        let candidates = secondary_by_id.get(result.artifact_id.as_str());
        for finding in findings(result) {
            let keywords = significant_keywords(finding);
            if keywords.is_empty() {
                continue;
            }
            overlap.primary_findings += 1;

            let needed = (keywords.len() as f64 * ratio).ceil().max(1.0) as usize;
            let matched = candidates.is_some_and(|sets| {
                sets.iter()
                    .any(|set| keywords.intersection(set).count() >= needed)
            });
            if matched {
                overlap.matched_findings += 1;
            }
        }
    }
    overlap
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge_core::OracleFailureKind;
    use gauge_oracle::Model;
    use tempfile::TempDir;

    fn judged(id: &str, strengths: &[&str], weaknesses: &[&str]) -> ExpensiveModeResult {
        ExpensiveModeResult {
            artifact_id: id.to_string(),
            score: 4.0,
            reasoning: String::new(),
            strengths: strengths.iter().map(|s| s.to_string()).collect(),
            weaknesses: weaknesses.iter().map(|s| s.to_string()).collect(),
            failure: None,
            attempts: 1,
        }
    }

    async fn controller(temp: &TempDir, window: u32) -> CalibrationController {
        CalibrationController::load(
            CalibrationConfig {
                window,
                ..CalibrationConfig::default()
            },
            temp.path().join("calibration.json"),
            OracleConfig::new(Model::Opus, 512),
            OracleConfig::new(Model::Sonnet, 512),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_overlap_matches_by_keywords() {
        let primary = vec![judged(
            "s-1",
            &["Explicit rollback strategy"],
            &["Telemetry requirements missing"],
        )];
        let secondary = vec![judged("s-1", &["Has a rollback strategy"], &["Unclear ownership"])];

        let overlap = finding_overlap(&primary, &secondary, 0.5);
        assert_eq!(overlap.primary_findings, 2);
        assert_eq!(overlap.matched_findings, 1);
        assert_eq!(overlap.rate(), 0.5);
    }

    #[test]
    fn test_overlap_requires_same_artifact() {
        let primary = vec![judged("s-1", &["Explicit rollback strategy"], &[])];
        let secondary = vec![judged("s-2", &["Explicit rollback strategy"], &[])];
        assert_eq!(finding_overlap(&primary, &secondary, 0.5).matched_findings, 0);
    }

    #[test]
    fn test_sentinels_are_skipped() {
        let primary = vec![ExpensiveModeResult::sentinel("s-1", OracleFailureKind::Timeout, 4)];
        let secondary = vec![judged("s-1", &["Explicit rollback strategy"], &[])];
        assert_eq!(finding_overlap(&primary, &secondary, 0.5), Overlap::default());
    }

    #[tokio::test]
    async fn test_high_overlap_adopts_secondary_after_window() {
        let temp = TempDir::new().unwrap();
        let mut calibration = controller(&temp, 2).await;
        let batch = vec![judged("s-1", &["Explicit rollback strategy"], &[])];

        assert!(calibration.is_calibrating());
        assert_eq!(calibration.record(1, &batch, &batch).await.unwrap(), None);
        assert_eq!(calibration.standing_config().model, Model::Opus);

        let decision = calibration.record(2, &batch, &batch).await.unwrap().unwrap();
        assert_eq!(decision.adopted, OracleRole::Secondary);
        assert_eq!(decision.adopted_config, "sonnet");
        assert_eq!(decision.decided_iteration, 2);
        assert_eq!(calibration.standing_config().model, Model::Sonnet);
        assert!(!calibration.is_calibrating());

        // Decided once: later batches are ignored
        assert_eq!(calibration.record(3, &batch, &[]).await.unwrap(), None);
        assert_eq!(calibration.decision().unwrap().decided_iteration, 2);
    }

    #[tokio::test]
    async fn test_low_overlap_keeps_primary() {
        let temp = TempDir::new().unwrap();
        let mut calibration = controller(&temp, 1).await;
        let primary = vec![judged("s-1", &["Explicit rollback strategy"], &[])];
        let secondary = vec![judged("s-1", &["Nice wording"], &[])];

        let decision = calibration.record(1, &primary, &secondary).await.unwrap().unwrap();
        assert_eq!(decision.adopted, OracleRole::Primary);
        assert_eq!(calibration.standing_config().model, Model::Opus);
    }

    #[tokio::test]
    async fn test_decision_persists_and_reset_reopens() {
        let temp = TempDir::new().unwrap();
        let batch = vec![judged("s-1", &["Explicit rollback strategy"], &[])];
        {
            let mut calibration = controller(&temp, 1).await;
            calibration.record(1, &batch, &batch).await.unwrap();
        }

        let mut reloaded = controller(&temp, 1).await;
        assert!(!reloaded.is_calibrating());
        assert_eq!(reloaded.decision().unwrap().adopted, OracleRole::Secondary);

        reloaded.reset().await.unwrap();
        assert!(reloaded.is_calibrating());
        assert!(!temp.path().join("calibration.json").exists());
        assert!(controller(&temp, 1).await.is_calibrating());
    }
}
