//! Crash-safe pattern storage
//!
//! Write path: temp file -> fsync -> re-read and validate -> copy primary to
//! backup -> rename temp over primary. A crash at any step leaves a valid
//! primary (old or new) in place.
//!
//! Read path: primary, then backup. If both exist and neither parses the
//! store is corrupt; an empty set is only returned when no file exists yet.

use gauge_core::{GaugeError, Pattern, PatternSource, PatternStatus, Polarity, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Current on-disk schema version
const SCHEMA_VERSION: u32 = 1;

/// Serialized form of the pattern set
#[derive(Debug, Serialize, Deserialize)]
struct PatternFile {
    version: u32,
    patterns: Vec<Pattern>,
}

impl PatternFile {
    fn validate(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(GaugeError::StoreWriteError(format!(
                "unsupported schema version {}",
                self.version
            )));
        }
        let mut seen = HashSet::new();
        for pattern in &self.patterns {
            pattern.validate()?;
            if !seen.insert(pattern.id.as_str()) {
                return Err(GaugeError::StoreWriteError(format!(
                    "duplicate pattern id {}",
                    pattern.id
                )));
            }
        }
        Ok(())
    }
}

/// Durable pattern collection backed by a primary and a backup JSON file
#[derive(Debug, Clone)]
pub struct PatternStore {
    primary: PathBuf,
    backup: PathBuf,
    temp: PathBuf,
}

impl PatternStore {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        let primary = primary.into();
        let backup = sibling(&primary, "bak");
        let temp = sibling(&primary, "tmp");
        Self {
            primary,
            backup,
            temp,
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Load the pattern set, falling back to the backup file
    pub async fn load(&self) -> Result<Vec<Pattern>> {
        let primary_exists = fs::try_exists(&self.primary).await?;
        let backup_exists = fs::try_exists(&self.backup).await?;

        if !primary_exists && !backup_exists {
            debug!("No pattern store at {:?}, starting empty", self.primary);
            return Ok(Vec::new());
        }

        let primary_err = match read_validated(&self.primary).await {
            Ok(patterns) => {
                debug!("Loaded {} patterns from {:?}", patterns.len(), self.primary);
                return Ok(patterns);
            }
            Err(e) => e,
        };
        warn!(
            "Primary pattern file {:?} unusable ({}), trying backup",
            self.primary, primary_err
        );

        match read_validated(&self.backup).await {
            Ok(patterns) => {
                warn!(
                    "Recovered {} patterns from backup {:?}",
                    patterns.len(),
                    self.backup
                );
                Ok(patterns)
            }
            Err(backup_err) => Err(GaugeError::StoreCorrupt(format!(
                "primary {:?}: {}; backup {:?}: {}",
                self.primary, primary_err, self.backup, backup_err
            ))),
        }
    }

    /// Persist the pattern set atomically
    pub async fn save(&self, patterns: &[Pattern]) -> Result<()> {
        if let Ok(previous) = self.load().await {
            guard_pruned(&previous, patterns)?;
        }

        let file = PatternFile {
            version: SCHEMA_VERSION,
            patterns: patterns.to_vec(),
        };
        file.validate()?;

        self.write_temp(&file).await?;

        if let Err(e) = read_validated(&self.temp).await {
            let _ = fs::remove_file(&self.temp).await;
            return Err(GaugeError::StoreWriteError(format!(
                "temp copy failed validation: {}",
                e
            )));
        }

        // Only a valid primary may replace the backup
        if fs::try_exists(&self.primary).await? {
            match read_validated(&self.primary).await {
                Ok(_) => {
                    fs::copy(&self.primary, &self.backup).await?;
                }
                Err(e) => warn!(
                    "Keeping backup {:?}; primary {:?} is unusable ({})",
                    self.backup, self.primary, e
                ),
            }
        }
        fs::rename(&self.temp, &self.primary).await?;

        info!("Saved {} patterns to {:?}", patterns.len(), self.primary);
        Ok(())
    }

    /// Full load-modify-save cycle
    pub async fn update<F>(&self, f: F) -> Result<Vec<Pattern>>
    where
        F: FnOnce(&mut Vec<Pattern>),
    {
        let mut patterns = self.load().await?;
        f(&mut patterns);
        self.save(&patterns).await?;
        Ok(patterns)
    }

    /// Install the given patterns if the store has none
    pub async fn seed_if_empty(&self, seeds: Vec<Pattern>) -> Result<usize> {
        let existing = self.load().await?;
        if !existing.is_empty() {
            return Ok(0);
        }
        let count = seeds.len();
        self.save(&seeds).await?;
        info!("Seeded pattern store with {} patterns", count);
        Ok(count)
    }

    async fn write_temp(&self, file: &PatternFile) -> Result<()> {
        if let Some(parent) = self.temp.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_vec_pretty(file)?;
        let mut handle = fs::File::create(&self.temp).await?;
        handle.write_all(&content).await?;
        handle.sync_all().await?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

async fn read_validated(path: &Path) -> Result<Vec<Pattern>> {
    let content = fs::read(path).await?;
    let file: PatternFile = serde_json::from_slice(&content)?;
    file.validate()?;
    Ok(file.patterns)
}

/// Pruned patterns may not be edited or dropped
fn guard_pruned(previous: &[Pattern], next: &[Pattern]) -> Result<()> {
    for old in previous.iter().filter(|p| p.status == PatternStatus::Pruned) {
        match next.iter().find(|p| p.id == old.id) {
            Some(new) if new == old => {}
            Some(_) => {
                return Err(GaugeError::StoreWriteError(format!(
                    "pruned pattern {} was modified",
                    old.id
                )))
            }
            None => {
                return Err(GaugeError::StoreWriteError(format!(
                    "pruned pattern {} was removed",
                    old.id
                )))
            }
        }
    }
    Ok(())
}

/// Seed patterns installed by `gauge init`
pub fn builtin_patterns() -> Vec<Pattern> {
    let seed = |polarity, description: &str, keywords: &[&str], weight| {
        Pattern::new(polarity, description)
            .with_keywords(keywords.iter().copied())
            .with_weight(weight)
            .with_source(PatternSource::Seed)
            .with_status(PatternStatus::Active)
    };

    vec![
        seed(
            Polarity::Good,
            "Names a measurable outcome",
            &["latency", "p95", "within", "percent", "metric"],
            0.5,
        ),
        seed(
            Polarity::Good,
            "Describes failure or rollback handling",
            &["rollback", "retry", "fallback", "error state"],
            0.5,
        ),
        seed(
            Polarity::Bad,
            "Leaves scope open-ended",
            &["etc", "and so on", "various", "misc"],
            0.5,
        ),
        seed(
            Polarity::Bad,
            "Defers decisions to later",
            &["tbd", "to be decided", "figure out"],
            0.75,
        ),
    ]
}
