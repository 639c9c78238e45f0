//! Bounded heuristic sub-scores
//!
//! Every function returns a value in [0.0, 1.0] together with a short reason.

use gauge_core::config::HeuristicsConfig;
use gauge_core::contains_term;

/// A sub-score and the reason it was awarded
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub value: f64,
    pub reason: String,
}

impl Scored {
    fn new(value: f64, reason: impl Into<String>) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }
}

/// Length within bounds is worth half; an action verb the other half
pub fn title_quality(title: &str, config: &HeuristicsConfig) -> Scored {
    let title = title.trim();
    let len = title.chars().count();
    let length_ok = (config.title_min_chars..=config.title_max_chars).contains(&len);

    let lower = title.to_lowercase();
    let mut words = lower.split_whitespace();
    let first = words.next().unwrap_or_default();
    let is_verb = |w: &str| config.action_verbs.iter().any(|v| v == w);

    let (verb_score, verb_note) = if is_verb(first) {
        (0.5, "leads with an action verb")
    } else if words.any(is_verb) {
        (0.25, "contains an action verb")
    } else {
        (0.0, "no action verb")
    };

    let length_score = if length_ok { 0.5 } else { 0.0 };
    Scored::new(
        length_score + verb_score,
        format!(
            "title: {} chars ({}), {}",
            len,
            if length_ok { "in bounds" } else { "out of bounds" },
            verb_note
        ),
    )
}

/// Full marks inside the ideal band, decaying proportionally outside it
pub fn acceptance_criteria(criteria: &[String], config: &HeuristicsConfig) -> Scored {
    let count = criteria.iter().filter(|c| !c.trim().is_empty()).count();
    let (min, max) = (config.ac_ideal_min.max(1), config.ac_ideal_max.max(1));

    let value = if count == 0 {
        0.0
    } else if count < min {
        count as f64 / min as f64
    } else if count > max {
        max as f64 / count as f64
    } else {
        1.0
    };
    Scored::new(
        value,
        format!("acceptance criteria: {} (ideal {}-{})", count, min, max),
    )
}

/// Full marks when the technical area or a service sits in a known namespace
pub fn technical_specificity(
    technical_area: Option<&str>,
    services: impl IntoIterator<Item = impl AsRef<str>>,
    config: &HeuristicsConfig,
) -> Scored {
    let references: Vec<String> = technical_area
        .into_iter()
        .map(str::to_string)
        .chain(services.into_iter().map(|s| s.as_ref().to_string()))
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();

    if references.is_empty() {
        return Scored::new(0.0, "technical area: none");
    }

    let known = references.iter().find(|r| {
        config
            .component_namespaces
            .iter()
            .any(|ns| r.starts_with(ns.as_str()) || r.contains(&format!("/{}", ns)))
    });
    match known {
        Some(reference) => Scored::new(1.0, format!("technical area: {} (known namespace)", reference)),
        None => Scored::new(
            0.5,
            format!("technical area: {} (unknown namespace)", references[0]),
        ),
    }
}

/// One value-statement keyword earns half, two or more earn full marks
pub fn user_value(lowercase_text: &str, config: &HeuristicsConfig) -> Scored {
    let hits: Vec<&str> = config
        .value_keywords
        .iter()
        .map(String::as_str)
        .filter(|k| contains_term(lowercase_text, k))
        .collect();

    let value = match hits.len() {
        0 => 0.0,
        1 => 0.5,
        _ => 1.0,
    };
    let reason = if hits.is_empty() {
        "user value: no value statement".to_string()
    } else {
        format!("user value: {}", hits.join(", "))
    };
    Scored::new(value, reason)
}

/// Description length and criteria count each worth half when in bounds.
///
/// Blank criteria are not counted.
pub fn scope(description: &str, criteria: &[String], config: &HeuristicsConfig) -> Scored {
    let len = description.trim().chars().count();
    let criteria_count = criteria.iter().filter(|c| !c.trim().is_empty()).count();
    let description_ok = (config.description_min_chars..=config.description_max_chars).contains(&len);
    let criteria_ok = (config.scope_ac_min..=config.scope_ac_max).contains(&criteria_count);

    let value = [description_ok, criteria_ok]
        .iter()
        .filter(|ok| **ok)
        .count() as f64
        * 0.5;
    Scored::new(
        value,
        format!(
            "scope: description {} chars, {} criteria",
            len, criteria_count
        ),
    )
}

/// Map a net pattern weight onto [0, 1]; zero net gives 0.5
pub fn pattern_contribution(net_weight: f64) -> f64 {
    (net_weight.clamp(-1.0, 1.0) + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HeuristicsConfig {
        HeuristicsConfig::default()
    }

    #[test]
    fn test_title_quality() {
        let c = config();
        assert_eq!(title_quality("Add CSV export to reports page", &c).value, 1.0);
        assert_eq!(title_quality("Reports page should support CSV", &c).value, 0.75);
        assert_eq!(title_quality("CSV", &c).value, 0.0);
        assert_eq!(title_quality(&"Add ".repeat(30), &c).value, 0.5);
    }

    #[test]
    fn test_acceptance_criteria_decay() {
        let c = config();
        let ac = |n: usize| vec!["criterion".to_string(); n];
        assert_eq!(acceptance_criteria(&ac(0), &c).value, 0.0);
        assert_eq!(acceptance_criteria(&ac(5), &c).value, 1.0);
        assert!((acceptance_criteria(&ac(1), &c).value - 1.0 / 3.0).abs() < 1e-9);
        assert!((acceptance_criteria(&ac(14), &c).value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_technical_specificity() {
        let c = config();
        let none: [&str; 0] = [];
        assert_eq!(technical_specificity(Some("src/billing"), none, &c).value, 1.0);
        assert_eq!(technical_specificity(Some("billing"), none, &c).value, 0.5);
        assert_eq!(technical_specificity(None, ["api/invoices"], &c).value, 1.0);
        assert_eq!(technical_specificity(None, none, &c).value, 0.0);
    }

    #[test]
    fn test_user_value() {
        let c = config();
        assert_eq!(user_value("export works", &c).value, 0.0);
        assert_eq!(user_value("the user can export", &c).value, 0.5);
        assert_eq!(user_value("as a user i can export so that", &c).value, 1.0);
        // Keywords inside longer words do not count
        assert_eq!(user_value("validate the username and customerid", &c).value, 0.0);
        assert_eq!(user_value("it reduces toil", &c).value, 0.5);
    }

    #[test]
    fn test_scope() {
        let c = config();
        let description = "x".repeat(100);
        let ac = |n: usize| vec!["criterion".to_string(); n];
        assert_eq!(scope(&description, &ac(4), &c).value, 1.0);
        assert_eq!(scope("short", &ac(4), &c).value, 0.5);
        assert_eq!(scope("short", &ac(0), &c).value, 0.0);
    }

    #[test]
    fn test_scope_ignores_blank_criteria() {
        let c = config();
        let blanks = vec!["".to_string(), "   ".to_string(), "\t".to_string()];
        let scored = scope("short", &blanks, &c);
        assert_eq!(scored.value, 0.0);
        assert!(scored.reason.contains("0 criteria"));
    }

    #[test]
    fn test_pattern_contribution_mapping() {
        assert_eq!(pattern_contribution(0.0), 0.5);
        assert_eq!(pattern_contribution(3.0), 1.0);
        assert_eq!(pattern_contribution(-1.5), 0.0);
        assert_eq!(pattern_contribution(0.5), 0.75);
    }
}
