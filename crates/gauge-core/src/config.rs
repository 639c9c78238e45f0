//! Configuration management for Gauge
//!
//! This module provides the configuration structures for a calibration run:
//! cheap-mode heuristics, oracle retry policy, gap analysis thresholds,
//! calibration window, convergence guards and storage layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{GaugeError, Result};

/// Name of the state directory created by `gauge init`
pub const STATE_DIR: &str = ".gauge";

/// Top-level Gauge configuration
///
/// Loaded from `.gauge/config.toml` in the working directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaugeConfig {
    #[serde(default)]
    pub heuristics: HeuristicsConfig,

    #[serde(default)]
    pub oracle: OracleSettings,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub convergence: ConvergenceConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Fixed heuristics used by the cheap evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    #[serde(default = "default_title_min_chars")]
    pub title_min_chars: usize,
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_action_verbs")]
    pub action_verbs: Vec<String>,
    /// Ideal acceptance-criteria band (inclusive)
    #[serde(default = "default_ac_ideal_min")]
    pub ac_ideal_min: usize,
    #[serde(default = "default_ac_ideal_max")]
    pub ac_ideal_max: usize,
    /// Known component/path namespaces for technical specificity
    #[serde(default = "default_component_namespaces")]
    pub component_namespaces: Vec<String>,
    #[serde(default = "default_value_keywords")]
    pub value_keywords: Vec<String>,
    /// Description length bounds for scope appropriateness
    #[serde(default = "default_description_min_chars")]
    pub description_min_chars: usize,
    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,
    /// Acceptance-criteria count bounds for scope appropriateness
    #[serde(default = "default_scope_ac_min")]
    pub scope_ac_min: usize,
    #[serde(default = "default_scope_ac_max")]
    pub scope_ac_max: usize,
}

/// Oracle selection and retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Higher-capability configuration (model name)
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    /// Cheaper configuration evaluated during calibration
    #[serde(default = "default_secondary_model")]
    pub secondary_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries after the first attempt on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on total backoff sleep per artifact
    #[serde(default = "default_max_backoff_total_ms")]
    pub max_backoff_total_ms: u64,
    /// Fraction of sentinel failures above which a batch is rejected
    #[serde(default = "default_failure_ceiling")]
    pub failure_ceiling: f64,
}

/// Gap analyzer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// |gap| above which an artifact is divergent
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold: f64,
    /// Accuracy below which an active pattern is rejected
    #[serde(default = "default_accuracy_floor")]
    pub accuracy_floor: f64,
    #[serde(default = "default_accuracy_step")]
    pub accuracy_step: f64,
    /// Iterations kept in each pattern's contribution window
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    /// Idle iterations before a pattern is pruned
    #[serde(default = "default_prune_after")]
    pub prune_after: u32,
    /// Keywords taken per proposed pattern
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    #[serde(default = "default_initial_weight")]
    pub initial_weight: f64,
    #[serde(default = "default_initial_accuracy")]
    pub initial_accuracy: f64,
}

/// Oracle calibration window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Iterations that run both oracle configurations
    #[serde(default = "default_calibration_window")]
    pub window: u32,
    /// Overlap rate at which the secondary configuration is adopted
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    /// Keyword share for a finding to count as reproduced
    #[serde(default = "default_finding_match_ratio")]
    pub finding_match_ratio: f64,
}

/// Convergence guards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "default_min_iterations")]
    pub min_iterations: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_cheap_score_floor")]
    pub cheap_score_floor: f64,
    #[serde(default = "default_gap_ceiling")]
    pub gap_ceiling: f64,
    /// Active-pattern count change must stay below this
    #[serde(default = "default_max_pattern_churn")]
    pub max_pattern_churn: usize,
    /// Consecutive non-improving iterations that signal a plateau
    #[serde(default = "default_plateau_window")]
    pub plateau_window: usize,
    /// Minimum decrease in mean absolute gap that counts as improvement
    #[serde(default)]
    pub min_improvement: f64,
    /// Retries of an iteration discarded as unreliable
    #[serde(default = "default_max_batch_retries")]
    pub max_batch_retries: u32,
}

/// On-disk layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Iteration logs retained (the baseline entry is always kept)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl StorageConfig {
    pub fn patterns_path(&self) -> PathBuf {
        self.state_dir.join("patterns.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join("history.jsonl")
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.state_dir.join("calibration.json")
    }

    pub fn activity_path(&self) -> PathBuf {
        self.state_dir.join("activity.md")
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join("config.toml")
    }
}

// Default value providers
fn default_title_min_chars() -> usize {
    10
}

fn default_title_max_chars() -> usize {
    80
}

fn default_action_verbs() -> Vec<String> {
    [
        "add", "allow", "build", "create", "enable", "fix", "implement", "improve", "migrate",
        "remove", "refactor", "show", "support", "update", "validate", "expose", "track",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ac_ideal_min() -> usize {
    3
}

fn default_ac_ideal_max() -> usize {
    7
}

fn default_component_namespaces() -> Vec<String> {
    [
        "src/", "api/", "services/", "frontend/", "backend/", "infra/", "db/", "pipeline/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_value_keywords() -> Vec<String> {
    [
        "so that", "as a", "in order to", "user", "customer", "enables", "reduces", "benefit",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_description_min_chars() -> usize {
    50
}

fn default_description_max_chars() -> usize {
    1200
}

fn default_scope_ac_min() -> usize {
    1
}

fn default_scope_ac_max() -> usize {
    10
}

fn default_primary_model() -> String {
    "opus".to_string()
}

fn default_secondary_model() -> String {
    "sonnet".to_string()
}

fn default_max_tokens() -> usize {
    2048
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_backoff_total_ms() -> u64 {
    30_000
}

fn default_failure_ceiling() -> f64 {
    0.2
}

fn default_gap_threshold() -> f64 {
    0.5
}

fn default_accuracy_floor() -> f64 {
    0.3
}

fn default_accuracy_step() -> f64 {
    0.1
}

fn default_rolling_window() -> usize {
    5
}

fn default_prune_after() -> u32 {
    10
}

fn default_max_keywords() -> usize {
    3
}

fn default_initial_weight() -> f64 {
    0.5
}

fn default_initial_accuracy() -> f64 {
    0.5
}

fn default_calibration_window() -> u32 {
    2
}

fn default_overlap_threshold() -> f64 {
    0.9
}

fn default_finding_match_ratio() -> f64 {
    0.5
}

fn default_min_iterations() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    20
}

fn default_cheap_score_floor() -> f64 {
    4.0
}

fn default_gap_ceiling() -> f64 {
    0.5
}

fn default_max_pattern_churn() -> usize {
    10
}

fn default_plateau_window() -> usize {
    5
}

fn default_max_batch_retries() -> u32 {
    3
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(STATE_DIR)
}

fn default_history_limit() -> usize {
    50
}

impl GaugeConfig {
    /// Load configuration from `<state_dir>/config.toml` or use defaults
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| GaugeError::Config(format!("Failed to parse config file: {}", e)))?
        } else {
            Self::default()
        };

        config.storage.state_dir = state_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `<state_dir>/config.toml`
    pub fn write_default(state_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(state_dir)?;

        let config_path = state_dir.join("config.toml");
        let mut config = Self::default();
        config.storage.state_dir = state_dir.to_path_buf();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| GaugeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.convergence;
        if c.min_iterations > c.max_iterations {
            return Err(GaugeError::Config(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                c.min_iterations, c.max_iterations
            )));
        }
        if c.max_iterations == 0 {
            return Err(GaugeError::Config("max_iterations must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.oracle.failure_ceiling) {
            return Err(GaugeError::Config(format!(
                "failure_ceiling {} outside [0, 1]",
                self.oracle.failure_ceiling
            )));
        }
        let h = &self.heuristics;
        if h.ac_ideal_min > h.ac_ideal_max || h.title_min_chars > h.title_max_chars {
            return Err(GaugeError::Config("heuristic bounds are inverted".into()));
        }
        if self.storage.history_limit < 2 {
            return Err(GaugeError::Config(
                "history_limit must keep the baseline and at least one recent entry".into(),
            ));
        }
        Ok(())
    }
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            title_min_chars: default_title_min_chars(),
            title_max_chars: default_title_max_chars(),
            action_verbs: default_action_verbs(),
            ac_ideal_min: default_ac_ideal_min(),
            ac_ideal_max: default_ac_ideal_max(),
            component_namespaces: default_component_namespaces(),
            value_keywords: default_value_keywords(),
            description_min_chars: default_description_min_chars(),
            description_max_chars: default_description_max_chars(),
            scope_ac_min: default_scope_ac_min(),
            scope_ac_max: default_scope_ac_max(),
        }
    }
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            primary_model: default_primary_model(),
            secondary_model: default_secondary_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_backoff_total_ms: default_max_backoff_total_ms(),
            failure_ceiling: default_failure_ceiling(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gap_threshold: default_gap_threshold(),
            accuracy_floor: default_accuracy_floor(),
            accuracy_step: default_accuracy_step(),
            rolling_window: default_rolling_window(),
            prune_after: default_prune_after(),
            max_keywords: default_max_keywords(),
            initial_weight: default_initial_weight(),
            initial_accuracy: default_initial_accuracy(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window: default_calibration_window(),
            overlap_threshold: default_overlap_threshold(),
            finding_match_ratio: default_finding_match_ratio(),
        }
    }
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            cheap_score_floor: default_cheap_score_floor(),
            gap_ceiling: default_gap_ceiling(),
            max_pattern_churn: default_max_pattern_churn(),
            plateau_window: default_plateau_window(),
            min_improvement: 0.0,
            max_batch_retries: default_max_batch_retries(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            history_limit: default_history_limit(),
        }
    }
}
