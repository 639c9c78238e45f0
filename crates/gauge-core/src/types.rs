//! Core type definitions for Gauge evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::{GaugeError, Result};

/// Artifact identifier (assigned by the upstream pipeline)
pub type ArtifactId = String;

/// Pattern identifier
pub type PatternId = String;

/// Lower bound of the normalized score range
pub const SCORE_MIN: f64 = 1.0;
/// Upper bound of the normalized score range
pub const SCORE_MAX: f64 = 5.0;
/// Upper bound for pattern weights
pub const WEIGHT_MAX: f64 = 2.0;

/// Whether a pattern rewards or penalizes an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Good,
    Bad,
}

impl Polarity {
    /// Direction this pattern pushes the cheap score (+1.0 or -1.0)
    pub fn sign(&self) -> f64 {
        match self {
            Self::Good => 1.0,
            Self::Bad => -1.0,
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

impl std::str::FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "good" | "+" => Ok(Self::Good),
            "bad" | "-" => Ok(Self::Bad),
            _ => Err(format!("Invalid polarity: {}", s)),
        }
    }
}

/// Pattern lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    #[default]
    Provisional,
    Rejected,
    Pruned,
}

impl PatternStatus {
    /// Whether patterns in this status are matched by the cheap evaluator
    pub fn participates(&self) -> bool {
        matches!(self, Self::Active | Self::Provisional)
    }

    /// Check if a lifecycle transition is allowed.
    ///
    /// Rejected and pruned patterns never come back; pruned is terminal.
    pub fn can_transition_to(&self, target: Self) -> bool {
        use PatternStatus::*;
        match (self, target) {
            (a, b) if *a == b => *a != Pruned,
            (Provisional, Active) => true,
            (Provisional | Active, Rejected) => true,
            (Provisional | Active | Rejected, Pruned) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Provisional => write!(f, "provisional"),
            Self::Rejected => write!(f, "rejected"),
            Self::Pruned => write!(f, "pruned"),
        }
    }
}

impl std::str::FromStr for PatternStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "provisional" => Ok(Self::Provisional),
            "rejected" => Ok(Self::Rejected),
            "pruned" => Ok(Self::Pruned),
            _ => Err(format!("Invalid pattern status: {}", s)),
        }
    }
}

/// Where a pattern came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    /// Shipped as a built-in seed rule
    Seed,
    /// Proposed by the gap analyzer
    #[default]
    GapAnalysis,
    /// Added by an operator
    Manual,
}

impl std::fmt::Display for PatternSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seed => write!(f, "seed"),
            Self::GapAnalysis => write!(f, "gap_analysis"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A single interpretable scoring rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier
    pub id: PatternId,
    /// Reward or penalty
    pub polarity: Polarity,
    /// Human-readable description
    pub description: String,
    /// Lowercase keywords; the pattern fires when any appears in the artifact
    pub keywords: BTreeSet<String>,
    /// Contribution to the cheap score, in [0.0, 2.0]
    pub weight: f64,
    /// Provenance
    pub source: PatternSource,
    /// When this pattern was discovered
    pub discovered_at: DateTime<Utc>,
    /// Iteration that discovered this pattern (0 for seeds)
    #[serde(default)]
    pub discovered_iteration: u32,
    /// Empirical accuracy, in [0.0, 1.0]
    pub accuracy: f64,
    /// Number of times this pattern has fired
    pub fire_count: u64,
    /// Lifecycle status
    pub status: PatternStatus,
    /// Last iteration in which this pattern fired
    #[serde(default)]
    pub last_fired_iteration: Option<u32>,
    /// Rolling window of per-iteration net gap contributions
    #[serde(default)]
    pub contributions: VecDeque<i32>,
}

impl Pattern {
    pub fn new(polarity: Polarity, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            polarity,
            description: description.into(),
            keywords: BTreeSet::new(),
            weight: 0.5,
            source: PatternSource::GapAnalysis,
            discovered_at: Utc::now(),
            discovered_iteration: 0,
            accuracy: 0.5,
            fire_count: 0,
            status: PatternStatus::Provisional,
            last_fired_iteration: None,
            contributions: VecDeque::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, WEIGHT_MAX);
        self
    }

    pub fn with_source(mut self, source: PatternSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_status(mut self, status: PatternStatus) -> Self {
        self.status = status;
        self
    }

    pub fn discovered_in(mut self, iteration: u32) -> Self {
        self.discovered_iteration = iteration;
        self
    }

    /// Whether any keyword occurs as a whole term in the (already lowercased) text
    pub fn matches(&self, lowercase_text: &str) -> bool {
        self.keywords.iter().any(|k| contains_term(lowercase_text, k))
    }

    /// Sum of the rolling contribution window
    pub fn rolling_contribution(&self) -> i32 {
        self.contributions.iter().sum()
    }

    /// Validate against the pattern schema
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(GaugeError::StoreWriteError("pattern id is empty".into()));
        }
        if self.keywords.is_empty() {
            return Err(GaugeError::StoreWriteError(format!(
                "pattern {} has no keywords",
                self.id
            )));
        }
        if !self.weight.is_finite() || !(0.0..=WEIGHT_MAX).contains(&self.weight) {
            return Err(GaugeError::StoreWriteError(format!(
                "pattern {} weight {} outside [0, {}]",
                self.id, self.weight, WEIGHT_MAX
            )));
        }
        if !self.accuracy.is_finite() || !(0.0..=1.0).contains(&self.accuracy) {
            return Err(GaugeError::StoreWriteError(format!(
                "pattern {} accuracy {} outside [0, 1]",
                self.id, self.accuracy
            )));
        }
        Ok(())
    }
}

/// A generated story draft scored by both evaluators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub description: String,
    /// Ordered acceptance criteria
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Technical area reference (component or path)
    #[serde(default)]
    pub technical_area: Option<String>,
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub source_conversations: BTreeSet<String>,
}

impl Artifact {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: Vec::new(),
            technical_area: None,
            services: BTreeSet::new(),
            source_conversations: BTreeSet::new(),
        }
    }

    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptance_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_technical_area(mut self, area: impl Into<String>) -> Self {
        self.technical_area = Some(area.into());
        self
    }

    pub fn with_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Title, description and criteria joined and lowercased for matching
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.description.len() + 64 * self.acceptance_criteria.len(),
        );
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.description);
        for criterion in &self.acceptance_criteria {
            text.push('\n');
            text.push_str(criterion);
        }
        text.to_lowercase()
    }
}

/// The six bounded heuristic components of a cheap score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub title_quality: f64,
    pub acceptance_criteria: f64,
    pub technical_specificity: f64,
    pub user_value: f64,
    pub scope: f64,
    pub pattern_contribution: f64,
}

impl SubScores {
    /// Number of components
    pub const COUNT: usize = 6;

    pub fn sum(&self) -> f64 {
        self.title_quality
            + self.acceptance_criteria
            + self.technical_specificity
            + self.user_value
            + self.scope
            + self.pattern_contribution
    }
}

/// Result of scoring an artifact locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheapModeResult {
    pub artifact_id: ArtifactId,
    /// Normalized score in [1.0, 5.0]
    pub score: f64,
    /// Unnormalized sum of sub-scores
    pub raw_score: f64,
    pub sub_scores: SubScores,
    pub reasons: Vec<String>,
    /// Patterns that fired, sorted by id
    pub matched_patterns: Vec<PatternId>,
    /// Patterns that should have fired but did not (after cross-validation)
    #[serde(default)]
    pub missed_patterns: Vec<PatternId>,
}

/// Why an oracle call ultimately failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleFailureKind {
    RateLimited,
    Timeout,
    ServerError,
    Permanent,
}

impl OracleFailureKind {
    /// Transient failures are retried with backoff
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

impl std::fmt::Display for OracleFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::ServerError => write!(f, "server_error"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Result of scoring an artifact with the reference oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpensiveModeResult {
    pub artifact_id: ArtifactId,
    /// Score in [1.0, 5.0]; 0.0 for sentinel failures
    pub score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    /// Set only on sentinel results
    #[serde(default)]
    pub failure: Option<OracleFailureKind>,
    /// Oracle calls made for this artifact
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl ExpensiveModeResult {
    /// Sentinel recorded when the oracle could not score an artifact
    pub fn sentinel(artifact_id: impl Into<String>, kind: OracleFailureKind, attempts: u32) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            score: 0.0,
            reasoning: format!("oracle failure: {}", kind),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            failure: Some(kind),
            attempts,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.failure.is_some()
    }
}

/// Cheap and expensive results for the same artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualModeResult {
    pub artifact_id: ArtifactId,
    pub cheap: CheapModeResult,
    pub expensive: ExpensiveModeResult,
    /// expensive.score - cheap.score
    pub gap: f64,
}

impl DualModeResult {
    /// Pair two results, refusing mismatched artifact ids
    pub fn pair(cheap: CheapModeResult, expensive: ExpensiveModeResult) -> Result<Self> {
        if cheap.artifact_id != expensive.artifact_id {
            return Err(GaugeError::MismatchedArtifact {
                cheap: cheap.artifact_id,
                expensive: expensive.artifact_id,
            });
        }
        let gap = expensive.score - cheap.score;
        Ok(Self {
            artifact_id: cheap.artifact_id.clone(),
            cheap,
            expensive,
            gap,
        })
    }

    pub fn is_sentinel(&self) -> bool {
        self.expensive.is_sentinel()
    }
}

/// Pattern counts by lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCounts {
    pub active: usize,
    pub provisional: usize,
    pub rejected: usize,
    pub pruned: usize,
}

impl PatternCounts {
    pub fn from_patterns(patterns: &[Pattern]) -> Self {
        let mut counts = Self::default();
        for pattern in patterns {
            match pattern.status {
                PatternStatus::Active => counts.active += 1,
                PatternStatus::Provisional => counts.provisional += 1,
                PatternStatus::Rejected => counts.rejected += 1,
                PatternStatus::Pruned => counts.pruned += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.active + self.provisional + self.rejected + self.pruned
    }
}

/// Aggregate metrics for one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub mean_expensive: f64,
    pub mean_cheap: f64,
    /// Mean signed gap (expensive - cheap)
    pub mean_gap: f64,
    /// Mean absolute gap
    pub mean_abs_gap: f64,
    /// Change in mean absolute gap from the previous iteration
    pub gap_delta: Option<f64>,
    pub pattern_counts: PatternCounts,
    /// Results that fed the means
    pub scored: usize,
    /// Sentinel failures excluded from the means
    pub sentinels: usize,
}

/// A change applied to the pattern store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternMutation {
    Proposed {
        pattern_id: PatternId,
        polarity: Polarity,
        keywords: Vec<String>,
        artifact_id: ArtifactId,
    },
    Promoted {
        pattern_id: PatternId,
    },
    Rejected {
        pattern_id: PatternId,
        reason: String,
    },
    Pruned {
        pattern_id: PatternId,
        idle_iterations: u32,
    },
    AccuracyAdjusted {
        pattern_id: PatternId,
        from: f64,
        to: f64,
    },
}

impl PatternMutation {
    pub fn pattern_id(&self) -> &str {
        match self {
            Self::Proposed { pattern_id, .. }
            | Self::Promoted { pattern_id }
            | Self::Rejected { pattern_id, .. }
            | Self::Pruned { pattern_id, .. }
            | Self::AccuracyAdjusted { pattern_id, .. } => pattern_id,
        }
    }
}

/// Health of a component during an iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unavailable,
}

/// Component health snapshot recorded with each iteration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub pattern_store: HealthStatus,
    pub oracle: HealthStatus,
    /// Fraction of sentinel results in the expensive batch
    pub oracle_failure_rate: f64,
    /// Name of the oracle configuration that scored the batch
    pub oracle_config: String,
}

/// Outcome of comparing the batch gap to the divergence threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceCheck {
    pub threshold: f64,
    pub mean_abs_gap: f64,
    /// Artifacts whose |gap| exceeded the threshold
    pub divergent_artifacts: Vec<ArtifactId>,
    pub exceeded: bool,
}

/// Terminal or continuing decision after an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceOutcome {
    Continuing,
    Converged,
    PlateauReached,
    MaxIterationsReached,
}

impl ConvergenceOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continuing)
    }
}

impl std::fmt::Display for ConvergenceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuing => write!(f, "continuing"),
            Self::Converged => write!(f, "converged"),
            Self::PlateauReached => write!(f, "plateau_reached"),
            Self::MaxIterationsReached => write!(f, "max_iterations_reached"),
        }
    }
}

/// Convergence decision with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCheck {
    pub outcome: ConvergenceOutcome,
    pub reason: String,
}

/// Which oracle configuration stands after calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleRole {
    Primary,
    Secondary,
}

/// The one-time choice between oracle configurations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDecision {
    pub adopted: OracleRole,
    pub adopted_config: String,
    pub overlap_rate: f64,
    pub threshold: f64,
    pub primary_findings: usize,
    pub matched_findings: usize,
    pub decided_iteration: u32,
    pub decided_at: DateTime<Utc>,
}

/// Full audit record of one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLog {
    pub iteration: u32,
    /// False when the iteration was interrupted by a stop request
    pub complete: bool,
    pub health: ComponentHealth,
    pub metrics: IterationMetrics,
    pub divergence: Option<DivergenceCheck>,
    pub results: Vec<DualModeResult>,
    pub mutations: Vec<PatternMutation>,
    pub convergence: Option<ConvergenceCheck>,
    #[serde(default)]
    pub calibration: Option<CalibrationDecision>,
    /// Sorted ids of the artifacts in the batch
    pub artifact_ids: Vec<ArtifactId>,
}

impl IterationLog {
    /// Artifact-id set for comparing batches across iterations
    pub fn artifact_set(&self) -> BTreeSet<&str> {
        self.artifact_ids.iter().map(String::as_str).collect()
    }
}

/// Whether `term` occurs in `text` without a word character on either side.
///
/// `etc` does not match inside "fetch", while multi-word terms such as
/// "so that" and paths such as "services/billing" match as written.
pub fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + term.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap(id: &str, score: f64) -> CheapModeResult {
        CheapModeResult {
            artifact_id: id.to_string(),
            score,
            raw_score: 0.0,
            sub_scores: SubScores::default(),
            reasons: Vec::new(),
            matched_patterns: Vec::new(),
            missed_patterns: Vec::new(),
        }
    }

    fn expensive(id: &str, score: f64) -> ExpensiveModeResult {
        ExpensiveModeResult {
            artifact_id: id.to_string(),
            score,
            reasoning: "fine".to_string(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            failure: None,
            attempts: 1,
        }
    }

    #[test]
    fn test_pair_computes_gap() {
        let dual = DualModeResult::pair(cheap("s-1", 3.25), expensive("s-1", 4.5)).unwrap();
        assert_eq!(dual.artifact_id, "s-1");
        assert_eq!(dual.gap, 4.5 - 3.25);
        assert_eq!(dual.cheap.artifact_id, dual.expensive.artifact_id);
    }

    #[test]
    fn test_pair_rejects_mismatched_ids() {
        let err = DualModeResult::pair(cheap("s-1", 3.0), expensive("s-2", 4.0)).unwrap_err();
        assert!(matches!(err, GaugeError::MismatchedArtifact { .. }));
    }

    #[test]
    fn test_sentinel() {
        let result = ExpensiveModeResult::sentinel("s-9", OracleFailureKind::RateLimited, 4);
        assert!(result.is_sentinel());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.reasoning, "oracle failure: rate_limited");
        assert_eq!(result.attempts, 4);
    }

    #[test]
    fn test_status_transitions() {
        use PatternStatus::*;
        assert!(Provisional.can_transition_to(Active));
        assert!(Active.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Pruned));
        assert!(!Rejected.can_transition_to(Active));
        assert!(!Pruned.can_transition_to(Active));
        assert!(!Pruned.can_transition_to(Pruned));
        assert!(!Active.can_transition_to(Provisional));
    }

    #[test]
    fn test_pattern_validation() {
        let pattern = Pattern::new(Polarity::Good, "mentions rollback")
            .with_keywords(["Rollback", "  "]);
        assert_eq!(pattern.keywords.len(), 1);
        assert!(pattern.keywords.contains("rollback"));
        assert!(pattern.validate().is_ok());

        let mut broken = pattern.clone();
        broken.accuracy = 1.5;
        assert!(broken.validate().is_err());

        let empty = Pattern::new(Polarity::Bad, "no keywords");
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_keywords_match_whole_terms() {
        let vague = Pattern::new(Polarity::Bad, "vague scope").with_keywords(["etc"]);
        assert!(!vague.matches("fetch the invoices nightly"));
        assert!(vague.matches("exports, imports, etc."));
        assert!(vague.matches("etc"));

        let user = Pattern::new(Polarity::Good, "names the user").with_keywords(["user"]);
        assert!(!user.matches("validate the username field"));
        assert!(user.matches("the user's export"));
    }

    #[test]
    fn test_contains_term_handles_phrases_and_paths() {
        assert!(contains_term("as a user i want so that it works", "so that"));
        assert!(!contains_term("also thatch roofing", "so that"));
        assert!(contains_term("touches services/billing/api", "services/billing"));
        assert!(!contains_term("subservices/billing", "services/billing"));
        assert!(contains_term("p95 latency", "p95"));
        assert!(!contains_term("anything", ""));
    }

    #[test]
    fn test_weight_is_clamped() {
        let pattern = Pattern::new(Polarity::Good, "heavy").with_weight(7.0);
        assert_eq!(pattern.weight, WEIGHT_MAX);
    }

    #[test]
    fn test_searchable_text_is_lowercase() {
        let artifact = Artifact::new("s-1", "Add Export", "Users NEED csv")
            .with_criteria(["Download Works"]);
        let text = artifact.searchable_text();
        assert!(text.contains("add export"));
        assert!(text.contains("download works"));
    }

    #[test]
    fn test_pattern_counts() {
        let patterns = vec![
            Pattern::new(Polarity::Good, "a").with_status(PatternStatus::Active),
            Pattern::new(Polarity::Good, "b"),
            Pattern::new(Polarity::Bad, "c").with_status(PatternStatus::Pruned),
        ];
        let counts = PatternCounts::from_patterns(&patterns);
        assert_eq!(counts.active, 1);
        assert_eq!(counts.provisional, 1);
        assert_eq!(counts.pruned, 1);
        assert_eq!(counts.total(), 3);
    }
}
