//! Keyword extraction from oracle findings

use std::collections::BTreeSet;

/// Shortest token treated as a keyword
const MIN_KEYWORD_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "above", "across", "after", "also", "although", "because", "been", "being", "both",
    "could", "does", "doing", "each", "either", "enough", "even", "every", "from", "further",
    "good", "great", "have", "having", "here", "however", "into", "itself", "just", "lacks",
    "less", "like", "makes", "many", "missing", "more", "most", "much", "must", "needs", "none",
    "only", "other", "over", "quite", "rather", "really", "same", "should", "some", "such",
    "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "under", "very", "well", "were", "what", "when", "where", "which", "while",
    "with", "within", "without", "would", "your",
    // Generic story vocabulary that says nothing about quality
    "story", "stories", "artifact", "acceptance", "criteria", "criterion", "description",
    "title", "clear", "clearly", "overall",
];

/// Lowercased significant tokens in order of appearance (duplicates kept)
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '/'))
        .map(|t| t.trim_matches(|c: char| c == '-' || c == '/').to_lowercase())
        .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Unique significant tokens in a piece of text
pub fn significant_keywords(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Pick up to `max` new keywords from findings, skipping any in `known`.
///
/// Keywords keep their first-seen order so the same findings always yield the
/// same proposal.
pub fn candidate_keywords(findings: &[String], known: &BTreeSet<String>, max: usize) -> Vec<String> {
    let mut picked: Vec<String> = Vec::new();
    for finding in findings {
        for token in tokenize(finding) {
            if picked.len() >= max {
                return picked;
            }
            if known.contains(&token) || picked.contains(&token) {
                continue;
            }
            picked.push(token);
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("Clear rollback plan, and the API has p95 latency targets!");
        assert_eq!(tokens, vec!["rollback", "plan", "latency", "targets"]);
    }

    #[test]
    fn test_tokenize_keeps_paths() {
        let tokens = tokenize("Touches services/billing and 2024");
        assert!(tokens.contains(&"touches".to_string()));
        assert!(tokens.contains(&"services/billing".to_string()));
        assert!(!tokens.contains(&"2024".to_string()));
    }

    #[test]
    fn test_candidates_skip_known_and_cap() {
        let findings = vec![
            "Explicit rollback strategy".to_string(),
            "Defines telemetry dashboards and alerts".to_string(),
        ];
        let known: BTreeSet<String> = ["rollback".to_string()].into_iter().collect();

        let picked = candidate_keywords(&findings, &known, 3);
        assert_eq!(picked, vec!["explicit", "strategy", "defines"]);
    }

    #[test]
    fn test_candidates_empty_when_all_known() {
        let findings = vec!["rollback rollback".to_string()];
        let known: BTreeSet<String> = ["rollback".to_string()].into_iter().collect();
        assert!(candidate_keywords(&findings, &known, 3).is_empty());
    }
}
