//! Cheap-mode evaluator

use gauge_core::config::HeuristicsConfig;
use gauge_core::{Artifact, CheapModeResult, Pattern, Polarity, SubScores, SCORE_MAX, SCORE_MIN};
use tracing::debug;

use crate::heuristics;

/// Deterministic local scorer
#[derive(Debug, Clone, Default)]
pub struct CheapModeEvaluator {
    config: HeuristicsConfig,
}

impl CheapModeEvaluator {
    pub fn new(config: HeuristicsConfig) -> Self {
        Self { config }
    }

    /// Score one artifact against the current pattern set.
    ///
    /// Only active and provisional patterns participate. Fire counts are not
    /// touched here; the gap analyzer owns them.
    pub fn evaluate(&self, artifact: &Artifact, patterns: &[Pattern]) -> CheapModeResult {
        let text = artifact.searchable_text();

        let title = heuristics::title_quality(&artifact.title, &self.config);
        let criteria = heuristics::acceptance_criteria(&artifact.acceptance_criteria, &self.config);
        let technical = heuristics::technical_specificity(
            artifact.technical_area.as_deref(),
            &artifact.services,
            &self.config,
        );
        let value = heuristics::user_value(&text, &self.config);
        let scope = heuristics::scope(&artifact.description, &artifact.acceptance_criteria, &self.config);

        let mut matched: Vec<&Pattern> = patterns
            .iter()
            .filter(|p| p.status.participates() && p.matches(&text))
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));

        let net_weight: f64 = matched
            .iter()
            .map(|p| match p.polarity {
                Polarity::Good => p.weight,
                Polarity::Bad => -p.weight,
            })
            .sum();

        let sub_scores = SubScores {
            title_quality: title.value,
            acceptance_criteria: criteria.value,
            technical_specificity: technical.value,
            user_value: value.value,
            scope: scope.value,
            pattern_contribution: heuristics::pattern_contribution(net_weight),
        };

        let mut reasons = vec![
            title.reason,
            criteria.reason,
            technical.reason,
            value.reason,
            scope.reason,
        ];
        reasons.extend(matched.iter().map(|p| {
            format!("pattern {} ({}): {}", p.id, p.polarity, p.description)
        }));

        let raw_score = sub_scores.sum();
        let score = (SCORE_MIN + raw_score / SubScores::COUNT as f64 * (SCORE_MAX - SCORE_MIN))
            .clamp(SCORE_MIN, SCORE_MAX);

        debug!(
            artifact = %artifact.id,
            score,
            matched = matched.len(),
            "Cheap evaluation"
        );

        CheapModeResult {
            artifact_id: artifact.id.clone(),
            score,
            raw_score,
            sub_scores,
            reasons,
            matched_patterns: matched.iter().map(|p| p.id.clone()).collect(),
            missed_patterns: Vec::new(),
        }
    }

    /// Score a batch in input order
    pub fn evaluate_batch(&self, artifacts: &[Artifact], patterns: &[Pattern]) -> Vec<CheapModeResult> {
        artifacts.iter().map(|a| self.evaluate(a, patterns)).collect()
    }
}
