//! Artifact batches from the upstream pipeline

use async_trait::async_trait;
use gauge_core::{Artifact, GaugeError, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// Supplier of the artifact batch scored each iteration
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn load_batch(&self) -> Result<Vec<Artifact>>;
}

/// Reads a JSON array of artifacts from disk
#[derive(Debug, Clone)]
pub struct JsonArtifactSource {
    path: PathBuf,
}

impl JsonArtifactSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ArtifactSource for JsonArtifactSource {
    async fn load_batch(&self) -> Result<Vec<Artifact>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GaugeError::ArtifactSource(format!("cannot read {:?}: {}", self.path, e))
        })?;
        let artifacts: Vec<Artifact> = serde_json::from_str(&content).map_err(|e| {
            GaugeError::ArtifactSource(format!("invalid artifact file {:?}: {}", self.path, e))
        })?;
        validate_batch(&artifacts)?;
        debug!("Loaded {} artifacts from {:?}", artifacts.len(), self.path);
        Ok(artifacts)
    }
}

/// A batch must be non-empty with unique, non-blank ids
pub fn validate_batch(artifacts: &[Artifact]) -> Result<()> {
    if artifacts.is_empty() {
        return Err(GaugeError::ArtifactSource("artifact batch is empty".into()));
    }
    let mut seen = HashSet::new();
    for artifact in artifacts {
        if artifact.id.trim().is_empty() {
            return Err(GaugeError::ArtifactSource("artifact with blank id".into()));
        }
        if !seen.insert(artifact.id.as_str()) {
            return Err(GaugeError::ArtifactSource(format!(
                "duplicate artifact id {}",
                artifact.id
            )));
        }
    }
    Ok(())
}
