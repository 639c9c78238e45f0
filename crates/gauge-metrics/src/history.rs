//! Append-only iteration log storage

use gauge_core::{GaugeError, IterationLog, IterationMetrics, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Baseline-versus-latest view used by `gauge metrics`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    /// Entries currently retained
    pub retained: usize,
    pub baseline: Option<IterationMetrics>,
    pub latest: Option<IterationMetrics>,
    /// Reduction in mean absolute gap since the baseline
    pub gap_reduction: Option<f64>,
}

/// JSONL file of iteration logs
#[derive(Debug, Clone)]
pub struct IterationHistory {
    path: PathBuf,
    limit: usize,
}

impl IterationHistory {
    /// `limit` is clamped to at least 2 (baseline plus latest)
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(2),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one log, compacting when the retained count exceeds the limit
    pub async fn append(&self, log: &IterationLog) -> Result<()> {
        let line = serde_json::to_string(log)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.drop_truncated_tail().await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        debug!(
            "Appended iteration {} (complete: {}) to {:?}",
            log.iteration, log.complete, self.path
        );

        let logs = self.load_all().await?;
        if logs.len() > self.limit {
            self.compact(logs).await?;
        }
        Ok(())
    }

    /// Load all retained logs in append order.
    ///
    /// A truncated final line (a crash mid-append) is skipped; damage
    /// anywhere else is an error.
    pub async fn load_all(&self) -> Result<Vec<IterationLog>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut logs = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<IterationLog>(line) {
                Ok(log) => logs.push(log),
                Err(e) if i + 1 == lines.len() && !content.ends_with('\n') => {
                    warn!("Skipping truncated last history entry: {}", e);
                }
                Err(e) => {
                    return Err(GaugeError::Other(format!(
                        "history entry {} in {:?} is unreadable: {}",
                        i + 1,
                        self.path,
                        e
                    )))
                }
            }
        }
        Ok(logs)
    }

    /// Most recent log, complete or not
    pub async fn latest(&self) -> Result<Option<IterationLog>> {
        Ok(self.load_all().await?.pop())
    }

    /// The first log ever recorded
    pub async fn baseline(&self) -> Result<Option<IterationLog>> {
        Ok(self.load_all().await?.into_iter().next())
    }

    /// Number for the next iteration (1 for an empty history)
    pub async fn next_iteration(&self) -> Result<u32> {
        Ok(self
            .latest()
            .await?
            .map(|log| log.iteration + 1)
            .unwrap_or(1))
    }

    pub async fn summary(&self) -> Result<HistorySummary> {
        let logs = self.load_all().await?;
        let baseline = logs.first().map(|l| l.metrics.clone());
        let latest = logs
            .iter()
            .rev()
            .find(|l| l.complete)
            .map(|l| l.metrics.clone());
        let gap_reduction = match (&baseline, &latest) {
            (Some(b), Some(l)) => Some(b.mean_abs_gap - l.mean_abs_gap),
            _ => None,
        };
        Ok(HistorySummary {
            retained: logs.len(),
            baseline,
            latest,
            gap_reduction,
        })
    }

    /// Rewrite the file with the baseline plus the newest `limit - 1` entries
    async fn compact(&self, logs: Vec<IterationLog>) -> Result<()> {
        let before = logs.len();
        let mut kept: Vec<&IterationLog> = Vec::with_capacity(self.limit);
        if let Some(first) = logs.first() {
            kept.push(first);
        }
        let tail_start = logs.len().saturating_sub(self.limit - 1).max(1);
        kept.extend(logs[tail_start..].iter());

        self.rewrite(&kept).await?;
        info!("Compacted iteration history from {} to {} entries", before, kept.len());
        Ok(())
    }

    /// Remove a partial last line so the next append starts on a fresh line
    async fn drop_truncated_tail(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(&self.path).await?;
        if content.is_empty() || content.ends_with('\n') {
            return Ok(());
        }
        let logs = self.load_all().await?;
        warn!("Repairing truncated history file {:?}", self.path);
        self.rewrite(&logs.iter().collect::<Vec<_>>()).await
    }

    async fn rewrite(&self, logs: &[&IterationLog]) -> Result<()> {
        let mut buffer = String::new();
        for log in logs {
            buffer.push_str(&serde_json::to_string(log)?);
            buffer.push('\n');
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(buffer.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gauge_core::{ComponentHealth, PatternCounts};
    use tempfile::TempDir;

    fn log(iteration: u32, mean_abs_gap: f64, complete: bool) -> IterationLog {
        IterationLog {
            iteration,
            complete,
            health: ComponentHealth::default(),
            metrics: IterationMetrics {
                iteration,
                timestamp: Utc::now(),
                mean_expensive: 4.0,
                mean_cheap: 4.0 - mean_abs_gap,
                mean_gap: mean_abs_gap,
                mean_abs_gap,
                gap_delta: None,
                pattern_counts: PatternCounts::default(),
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

    fn history(dir: &TempDir, limit: usize) -> IterationHistory {
        IterationHistory::new(dir.path().join(".gauge/history.jsonl"), limit)
    }

    #[tokio::test]
    async fn test_empty_history() {
        let temp = TempDir::new().unwrap();
        let history = history(&temp, 50);
        assert!(history.load_all().await.unwrap().is_empty());
        assert_eq!(history.latest().await.unwrap(), None);
        assert_eq!(history.next_iteration().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_and_load() {
        let temp = TempDir::new().unwrap();
        let history = history(&temp, 50);

        history.append(&log(1, 1.5, true)).await.unwrap();
        history.append(&log(2, 1.0, true)).await.unwrap();

        let logs = history.load_all().await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].iteration, 1);
        assert_eq!(logs[0].metrics.mean_abs_gap, 1.5);
        assert_eq!(logs[1].artifact_ids, vec!["s-1", "s-2", "s-3"]);
        assert_eq!(history.next_iteration().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_compaction_preserves_baseline() {
        let temp = TempDir::new().unwrap();
        let history = history(&temp, 4);

        for i in 1..=7 {
            history.append(&log(i, 2.0 / i as f64, true)).await.unwrap();
        }

        let iterations: Vec<u32> = history
            .load_all()
            .await
            .unwrap()
            .iter()
            .map(|l| l.iteration)
            .collect();
        assert_eq!(iterations, vec![1, 5, 6, 7]);
        assert!(!temp.path().join(".gauge/history.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_truncated_tail_is_skipped() {
        let temp = TempDir::new().unwrap();
        let history = history(&temp, 50);
        history.append(&log(1, 1.0, true)).await.unwrap();

        let mut content = std::fs::read_to_string(history.path()).unwrap();
        content.push_str("{\"iteration\": 2, \"compl");
        std::fs::write(history.path(), content).unwrap();

        let logs = history.load_all().await.unwrap();
        assert_eq!(logs.len(), 1);

        history.append(&log(2, 0.5, true)).await.unwrap();
        let iterations: Vec<u32> = history
            .load_all()
            .await
            .unwrap()
            .iter()
            .map(|l| l.iteration)
            .collect();
        assert_eq!(iterations, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_interior_damage_is_an_error() {
        let temp = TempDir::new().unwrap();
        let history = history(&temp, 50);
        history.append(&log(1, 1.0, true)).await.unwrap();

        let mut content = String::from("not json\n");
        content.push_str(&std::fs::read_to_string(history.path()).unwrap());
        std::fs::write(history.path(), content).unwrap();

        assert!(history.load_all().await.is_err());
    }

    #[tokio::test]
    async fn test_summary_uses_latest_complete() {
        let temp = TempDir::new().unwrap();
        let history = history(&temp, 50);
        history.append(&log(1, 2.0, true)).await.unwrap();
        history.append(&log(2, 0.5, true)).await.unwrap();
        history.append(&log(3, 0.1, false)).await.unwrap();

        let summary = history.summary().await.unwrap();
        assert_eq!(summary.retained, 3);
        assert_eq!(summary.latest.unwrap().iteration, 2);
        assert!((summary.gap_reduction.unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(history.baseline().await.unwrap().unwrap().iteration, 1);
    }
}
