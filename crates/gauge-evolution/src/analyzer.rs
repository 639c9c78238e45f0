//! Gap analysis between cheap and expensive results
//!
//! The analyzer is the only place that changes pattern accuracy, fire counts
//! or lifecycle status. It works on an owned copy of the pattern set; the
//! caller persists the result through the pattern store.

use chrono::Utc;
use gauge_core::config::AnalysisConfig;
use gauge_core::{
    DivergenceCheck, DualModeResult, IterationMetrics, Pattern, PatternCounts, PatternMutation,
    PatternStatus, Polarity,
};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use crate::keywords::candidate_keywords;

/// Output of one analysis pass
#[derive(Debug, Clone)]
pub struct GapAnalysis {
    pub metrics: IterationMetrics,
    pub divergence: DivergenceCheck,
    pub mutations: Vec<PatternMutation>,
    /// Pattern set after mutations, ready to save
    pub patterns: Vec<Pattern>,
    /// Results with cross-validated `missed_patterns`
    pub results: Vec<DualModeResult>,
}

/// Compares dual-mode results and proposes pattern edits
pub struct GapAnalyzer {
    config: AnalysisConfig,
}

impl GapAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze one iteration's results
    pub fn analyze(
        &self,
        iteration: u32,
        mut results: Vec<DualModeResult>,
        patterns: &[Pattern],
        previous: Option<&IterationMetrics>,
    ) -> GapAnalysis {
        let mut patterns = patterns.to_vec();
        let mut mutations = Vec::new();

        for result in results.iter_mut().filter(|r| !r.is_sentinel()) {
            cross_validate(result, &patterns);
        }

        let fired = self.record_firings(iteration, &results, &mut patterns);
        self.apply_lifecycle(iteration, &fired, &mut patterns, &mut mutations);
        self.propose(iteration, &results, &mut patterns, &mut mutations);

        let divergence = self.divergence(&results);
        let metrics = iteration_metrics(iteration, &results, &patterns, previous);

        info!(
            iteration,
            mean_gap = metrics.mean_gap,
            mean_abs_gap = metrics.mean_abs_gap,
            mutations = mutations.len(),
            "Gap analysis complete"
        );

        GapAnalysis {
            metrics,
            divergence,
            mutations,
            patterns,
            results,
        }
    }

    /// Bump fire counts and push each fired pattern's net contribution.
    ///
    /// Only scored (non-sentinel) results are counted. Returns the ids of
    /// patterns that fired on a scored artifact.
    fn record_firings(
        &self,
        iteration: u32,
        results: &[DualModeResult],
        patterns: &mut [Pattern],
    ) -> BTreeSet<String> {
        let mut fires: HashMap<&str, u64> = HashMap::new();
        let mut net: HashMap<&str, i32> = HashMap::new();
        let polarity: HashMap<String, Polarity> =
            patterns.iter().map(|p| (p.id.clone(), p.polarity)).collect();

        // Sentinel results carry no oracle signal and do not count as firings
        for result in results.iter().filter(|r| !r.is_sentinel()) {
            for id in &result.cheap.matched_patterns {
                *fires.entry(id.as_str()).or_default() += 1;
                let Some(polarity) = polarity.get(id) else {
                    continue;
                };
                let helpful = result.gap.abs() <= self.config.gap_threshold
                    || result.gap.signum() == polarity.sign();
                *net.entry(id.as_str()).or_default() += if helpful { 1 } else { -1 };
            }
        }

        let mut fired_scored = BTreeSet::new();
        for pattern in patterns.iter_mut() {
            if pattern.status == PatternStatus::Pruned {
                continue;
            }
            if let Some(count) = fires.get(pattern.id.as_str()) {
                pattern.fire_count += count;
                pattern.last_fired_iteration = Some(iteration);
            }
            if let Some(contribution) = net.get(pattern.id.as_str()) {
                pattern.contributions.push_back(*contribution);
                while pattern.contributions.len() > self.config.rolling_window {
                    pattern.contributions.pop_front();
                }
                fired_scored.insert(pattern.id.clone());
            }
        }
        fired_scored
    }

    fn apply_lifecycle(
        &self,
        iteration: u32,
        fired: &BTreeSet<String>,
        patterns: &mut [Pattern],
        mutations: &mut Vec<PatternMutation>,
    ) {
        for pattern in patterns.iter_mut() {
            match pattern.status {
                PatternStatus::Pruned => continue,
                PatternStatus::Active if fired.contains(&pattern.id) => {
                    self.adjust_accuracy(pattern, mutations);
                }
                PatternStatus::Provisional
                    if fired.contains(&pattern.id) && iteration > pattern.discovered_iteration =>
                {
                    let rolling = pattern.rolling_contribution();
                    if rolling >= 0 {
                        if set_status(pattern, PatternStatus::Active) {
                            mutations.push(PatternMutation::Promoted {
                                pattern_id: pattern.id.clone(),
                            });
                        }
                    } else {
                        reject(
                            pattern,
                            format!("net-negative gap contribution ({}) on validation", rolling),
                            mutations,
                        );
                    }
                }
                _ => {}
            }

            if pattern.status == PatternStatus::Pruned {
                continue;
            }
            let last_seen = pattern
                .last_fired_iteration
                .unwrap_or(pattern.discovered_iteration);
            let idle = iteration.saturating_sub(last_seen);
            if idle >= self.config.prune_after {
                if set_status(pattern, PatternStatus::Pruned) {
                    debug!("Pruned pattern {} after {} idle iterations", pattern.id, idle);
                    mutations.push(PatternMutation::Pruned {
                        pattern_id: pattern.id.clone(),
                        idle_iterations: idle,
                    });
                }
            }
        }
    }

    fn adjust_accuracy(&self, pattern: &mut Pattern, mutations: &mut Vec<PatternMutation>) {
        let rolling = pattern.rolling_contribution();
        let from = pattern.accuracy;
        let to = match rolling.signum() {
            -1 => (from - self.config.accuracy_step).max(0.0),
            1 => (from + self.config.accuracy_step).min(1.0),
            _ => from,
        };
        if to != from {
            pattern.accuracy = to;
            mutations.push(PatternMutation::AccuracyAdjusted {
                pattern_id: pattern.id.clone(),
                from,
                to,
            });
        }
        if pattern.accuracy < self.config.accuracy_floor {
            let reason = format!(
                "accuracy {:.2} below floor {:.2}",
                pattern.accuracy, self.config.accuracy_floor
            );
            reject(pattern, reason, mutations);
        }
    }

    /// At most one new provisional pattern per divergent artifact
    fn propose(
        &self,
        iteration: u32,
        results: &[DualModeResult],
        patterns: &mut Vec<Pattern>,
        mutations: &mut Vec<PatternMutation>,
    ) {
        let mut known: BTreeSet<String> = patterns
            .iter()
            .flat_map(|p| p.keywords.iter().cloned())
            .collect();

        for result in results.iter().filter(|r| !r.is_sentinel()) {
            let (polarity, findings) = if result.gap > self.config.gap_threshold {
                (Polarity::Good, &result.expensive.strengths)
            } else if result.gap < -self.config.gap_threshold {
                (Polarity::Bad, &result.expensive.weaknesses)
            } else {
                continue;
            };

            let mut keywords = candidate_keywords(findings, &known, self.config.max_keywords);
            if keywords.is_empty() {
                let reasoning = std::slice::from_ref(&result.expensive.reasoning);
                keywords = candidate_keywords(reasoning, &known, self.config.max_keywords);
            }
            if keywords.is_empty() {
                debug!(
                    "No unclaimed keywords for divergent artifact {}",
                    result.artifact_id
                );
                continue;
            }

            let label = match polarity {
                Polarity::Good => "strength",
                Polarity::Bad => "weakness",
            };
            let mut pattern = Pattern::new(
                polarity,
                format!(
                    "Oracle-cited {} on {}: {}",
                    label,
                    result.artifact_id,
                    keywords.join(", ")
                ),
            )
            .with_keywords(&keywords)
            .with_weight(self.config.initial_weight)
            .discovered_in(iteration);
            pattern.accuracy = self.config.initial_accuracy;

            info!(
                "Proposing {} pattern {} from artifact {} (gap {:+.2})",
                polarity, pattern.id, result.artifact_id, result.gap
            );
            known.extend(keywords.iter().cloned());
            mutations.push(PatternMutation::Proposed {
                pattern_id: pattern.id.clone(),
                polarity,
                keywords,
                artifact_id: result.artifact_id.clone(),
            });
            patterns.push(pattern);
        }
    }

    fn divergence(&self, results: &[DualModeResult]) -> DivergenceCheck {
        let scored: Vec<&DualModeResult> = results.iter().filter(|r| !r.is_sentinel()).collect();
        let divergent_artifacts: Vec<String> = scored
            .iter()
            .filter(|r| r.gap.abs() > self.config.gap_threshold)
            .map(|r| r.artifact_id.clone())
            .collect();
        DivergenceCheck {
            threshold: self.config.gap_threshold,
            mean_abs_gap: mean(scored.iter().map(|r| r.gap.abs())),
            exceeded: !divergent_artifacts.is_empty(),
            divergent_artifacts,
        }
    }
}

/// Fill `missed_patterns`: patterns the oracle's findings point to that did not fire
fn cross_validate(result: &mut DualModeResult, patterns: &[Pattern]) {
    let strengths = result.expensive.strengths.join("\n").to_lowercase();
    let weaknesses = result.expensive.weaknesses.join("\n").to_lowercase();

    let mut missed: Vec<String> = patterns
        .iter()
        .filter(|p| p.status.participates())
        .filter(|p| !result.cheap.matched_patterns.contains(&p.id))
        .filter(|p| match p.polarity {
            Polarity::Good => p.matches(&strengths),
            Polarity::Bad => p.matches(&weaknesses),
        })
        .map(|p| p.id.clone())
        .collect();
    missed.sort();
    result.cheap.missed_patterns = missed;
}

/// Apply a lifecycle change; false when it is a no-op or not allowed
fn set_status(pattern: &mut Pattern, target: PatternStatus) -> bool {
    if pattern.status == target || !pattern.status.can_transition_to(target) {
        return false;
    }
    pattern.status = target;
    true
}

fn reject(pattern: &mut Pattern, reason: String, mutations: &mut Vec<PatternMutation>) {
    if set_status(pattern, PatternStatus::Rejected) {
        info!("Rejected pattern {}: {}", pattern.id, reason);
        mutations.push(PatternMutation::Rejected {
            pattern_id: pattern.id.clone(),
            reason,
        });
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Aggregate metrics over a batch; sentinels are counted but not averaged
pub fn iteration_metrics(
    iteration: u32,
    results: &[DualModeResult],
    patterns: &[Pattern],
    previous: Option<&IterationMetrics>,
) -> IterationMetrics {
    let scored: Vec<&DualModeResult> = results.iter().filter(|r| !r.is_sentinel()).collect();
    let mean_abs_gap = mean(scored.iter().map(|r| r.gap.abs()));

    IterationMetrics {
        iteration,
        timestamp: Utc::now(),
        mean_expensive: mean(scored.iter().map(|r| r.expensive.score)),
        mean_cheap: mean(scored.iter().map(|r| r.cheap.score)),
        mean_gap: mean(scored.iter().map(|r| r.gap)),
        mean_abs_gap,
        gap_delta: previous.map(|p| mean_abs_gap - p.mean_abs_gap),
        pattern_counts: PatternCounts::from_patterns(patterns),
        scored: scored.len(),
        sentinels: results.len() - scored.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge_core::{CheapModeResult, ExpensiveModeResult, OracleFailureKind, SubScores};

    fn dual(id: &str, cheap: f64, expensive: f64, matched: &[&str]) -> DualModeResult {
        DualModeResult::pair(
            CheapModeResult {
                artifact_id: id.to_string(),
                score: cheap,
                raw_score: 0.0,
                sub_scores: SubScores::default(),
                reasons: Vec::new(),
                matched_patterns: matched.iter().map(|s| s.to_string()).collect(),
                missed_patterns: Vec::new(),
            },
            ExpensiveModeResult {
                artifact_id: id.to_string(),
                score: expensive,
                reasoning: "Solid migration story overall".to_string(),
                strengths: vec!["Explicit rollback strategy".to_string()],
                weaknesses: vec!["Vague telemetry requirements".to_string()],
                failure: None,
                attempts: 1,
            },
        )
        .unwrap()
    }

    fn pattern(id: &str, polarity: Polarity, status: PatternStatus, keywords: &[&str]) -> Pattern {
        let mut p = Pattern::new(polarity, id)
            .with_keywords(keywords.iter().copied())
            .with_status(status);
        p.id = id.to_string();
        p
    }

    fn analyzer() -> GapAnalyzer {
        GapAnalyzer::new(AnalysisConfig::default())
    }

    #[test]
    fn test_proposes_good_pattern_when_cheap_underscores() {
        let results = vec![dual("s-1", 2.5, 5.0, &[])];
        let analysis = analyzer().analyze(1, results, &[], None);

        assert_eq!(analysis.patterns.len(), 1);
        let proposed = &analysis.patterns[0];
        assert_eq!(proposed.status, PatternStatus::Provisional);
        assert_eq!(proposed.polarity, Polarity::Good);
        assert!(proposed.keywords.contains("rollback"));
        assert_eq!(proposed.discovered_iteration, 1);
        assert!(matches!(
            analysis.mutations[0],
            PatternMutation::Proposed { .. }
        ));
        assert!(analysis.divergence.exceeded);
    }

    #[test]
    fn test_proposes_bad_pattern_when_cheap_overscores() {
        let results = vec![dual("s-1", 4.8, 2.0, &[])];
        let analysis = analyzer().analyze(1, results, &[], None);

        assert_eq!(analysis.patterns.len(), 1);
        assert_eq!(analysis.patterns[0].polarity, Polarity::Bad);
        assert!(analysis.patterns[0].keywords.contains("telemetry"));
    }

    #[test]
    fn test_one_proposal_per_artifact_and_no_duplicate_keywords() {
        let results = vec![dual("s-1", 2.0, 5.0, &[]), dual("s-2", 2.0, 5.0, &[])];
        let analysis = analyzer().analyze(1, results, &[], None);

        // Second artifact shares the same strengths; reasoning supplies new keywords
        assert_eq!(analysis.patterns.len(), 2);
        let first = &analysis.patterns[0].keywords;
        let second = &analysis.patterns[1].keywords;
        assert!(first.is_disjoint(second));
    }

    #[test]
    fn test_no_proposal_within_threshold() {
        let results = vec![dual("s-1", 4.0, 4.4, &[])];
        let analysis = analyzer().analyze(1, results, &[], None);
        assert!(analysis.patterns.is_empty());
        assert!(!analysis.divergence.exceeded);
    }

    #[test]
    fn test_provisional_promoted_after_later_pass() {
        let mut p = pattern("p-1", Polarity::Good, PatternStatus::Provisional, &["rollback"]);
        p.discovered_iteration = 1;

        let analysis = analyzer().analyze(2, vec![dual("s-1", 3.0, 5.0, &["p-1"])], &[p], None);

        let p = &analysis.patterns[0];
        assert_eq!(p.status, PatternStatus::Active);
        assert_eq!(p.fire_count, 1);
        assert_eq!(p.last_fired_iteration, Some(2));
        assert!(analysis
            .mutations
            .contains(&PatternMutation::Promoted { pattern_id: "p-1".into() }));
    }

    #[test]
    fn test_provisional_not_validated_in_discovery_iteration() {
        let mut p = pattern("p-1", Polarity::Good, PatternStatus::Provisional, &["rollback"]);
        p.discovered_iteration = 2;

        let analysis = analyzer().analyze(2, vec![dual("s-1", 3.0, 5.0, &["p-1"])], &[p], None);
        assert_eq!(analysis.patterns[0].status, PatternStatus::Provisional);
    }

    #[test]
    fn test_provisional_rejected_on_negative_contribution() {
        // Good pattern fired while cheap already over-scored
        let mut p = pattern("p-1", Polarity::Good, PatternStatus::Provisional, &["rollback"]);
        p.discovered_iteration = 1;

        let analysis = analyzer().analyze(2, vec![dual("s-1", 4.5, 2.0, &["p-1"])], &[p], None);
        assert_eq!(analysis.patterns[0].status, PatternStatus::Rejected);
    }

    #[test]
    fn test_active_accuracy_decrements_until_rejected() {
        let mut p = pattern("p-1", Polarity::Bad, PatternStatus::Active, &["vague"]);
        p.accuracy = 0.45;

        // Bad pattern fired while cheap under-scored: harmful
        let a = analyzer();
        let first = a.analyze(3, vec![dual("s-1", 2.0, 4.0, &["p-1"])], &[p], None);
        let p = &first.patterns[0];
        assert!((p.accuracy - 0.35).abs() < 1e-9);
        assert_eq!(p.status, PatternStatus::Active);

        let second = a.analyze(4, vec![dual("s-1", 2.0, 4.0, &["p-1"])], &first.patterns, None);
        let p = second.patterns.iter().find(|p| p.id == "p-1").unwrap();
        assert!(p.accuracy < 0.3);
        assert_eq!(p.status, PatternStatus::Rejected);
    }

    #[test]
    fn test_rejected_never_returns_to_active() {
        let mut p = pattern("p-1", Polarity::Good, PatternStatus::Rejected, &["rollback"]);
        p.accuracy = 0.9;
        p.last_fired_iteration = Some(4);

        let analysis = analyzer().analyze(5, vec![dual("s-1", 3.0, 5.0, &["p-1"])], &[p], None);
        assert_eq!(analysis.patterns[0].status, PatternStatus::Rejected);
    }

    #[test]
    fn test_idle_patterns_are_pruned_and_frozen() {
        let mut idle = pattern("p-1", Polarity::Good, PatternStatus::Active, &["kubernetes"]);
        idle.last_fired_iteration = Some(1);

        let analysis = analyzer().analyze(11, vec![dual("s-1", 4.0, 4.2, &[])], &[idle], None);
        let p = &analysis.patterns[0];
        assert_eq!(p.status, PatternStatus::Pruned);

        let frozen = p.clone();
        let results = vec![dual("s-1", 4.0, 4.2, &["p-1"])];
        let again = analyzer().analyze(12, results, &[frozen.clone()], None);
        assert_eq!(again.patterns[0], frozen);
    }

    #[test]
    fn test_sentinels_are_excluded_from_means() {
        let sentinel = DualModeResult::pair(
            dual("s-2", 3.0, 3.0, &[]).cheap,
            ExpensiveModeResult::sentinel("s-2", OracleFailureKind::Timeout, 4),
        )
        .unwrap();
        let results = vec![dual("s-1", 3.0, 4.0, &[]), sentinel];

        let analysis = analyzer().analyze(1, results, &[], None);
        assert_eq!(analysis.metrics.scored, 1);
        assert_eq!(analysis.metrics.sentinels, 1);
        assert_eq!(analysis.metrics.mean_expensive, 4.0);
        assert_eq!(analysis.metrics.mean_gap, 1.0);
        assert_eq!(analysis.patterns.len(), 1);
    }

    #[test]
    fn test_sentinel_only_batch_leaves_fire_stats_alone() {
        let mut p = pattern("p-1", Polarity::Good, PatternStatus::Active, &["rollback"]);
        p.fire_count = 2;
        p.last_fired_iteration = Some(3);
        p.contributions.push_back(1);

        let sentinel = DualModeResult::pair(
            dual("s-1", 3.0, 3.0, &["p-1"]).cheap,
            ExpensiveModeResult::sentinel("s-1", OracleFailureKind::Timeout, 4),
        )
        .unwrap();
        let analysis = analyzer().analyze(5, vec![sentinel], &[p.clone()], None);

        let after = &analysis.patterns[0];
        assert_eq!(after.fire_count, 2);
        assert_eq!(after.last_fired_iteration, Some(3));
        assert_eq!(after.contributions, p.contributions);
        assert_eq!(after.accuracy, p.accuracy);
    }

    #[test]
    fn test_cross_validation_marks_missed_patterns() {
        let p = pattern("p-1", Polarity::Good, PatternStatus::Active, &["rollback"]);
        let analysis = analyzer().analyze(1, vec![dual("s-1", 4.0, 4.2, &[])], &[p], None);
        assert_eq!(analysis.results[0].cheap.missed_patterns, vec!["p-1".to_string()]);
    }

    #[test]
    fn test_gap_delta_against_previous() {
        let first = analyzer().analyze(1, vec![dual("s-1", 3.0, 4.0, &[])], &[], None);
        let second = analyzer().analyze(
            2,
            vec![dual("s-1", 3.5, 4.0, &[])],
            &first.patterns,
            Some(&first.metrics),
        );
        assert!((second.metrics.gap_delta.unwrap() - (-0.5)).abs() < 1e-9);
    }
}
