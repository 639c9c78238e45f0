//! Oracle prompt and reply parsing
//!
//! The oracle answers in free text that must embed one JSON object:
//! `{"score": f64, "reasoning": str, "strengths": [str], "weaknesses": [str]}`.

use gauge_core::Artifact;
use std::fmt::Write;

use crate::types::{OracleFailure, OracleVerdict};

/// Build the judging prompt for one artifact
pub fn build_prompt(artifact: &Artifact) -> String {
    let mut prompt = String::from(
        "You are reviewing an engineering story drafted from team conversations.\n\
         Judge it as a senior engineer deciding whether it is ready for a sprint.\n\n",
    );

    let _ = writeln!(prompt, "## Title\n{}\n", artifact.title);
    let _ = writeln!(prompt, "## Description\n{}\n", artifact.description);

    prompt.push_str("## Acceptance Criteria\n");
    if artifact.acceptance_criteria.is_empty() {
        prompt.push_str("(none)\n");
    }
    for (i, criterion) in artifact.acceptance_criteria.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, criterion);
    }

    if let Some(area) = &artifact.technical_area {
        let _ = writeln!(prompt, "\n## Technical Area\n{}", area);
    }
    if !artifact.services.is_empty() {
        let services: Vec<&str> = artifact.services.iter().map(String::as_str).collect();
        let _ = writeln!(prompt, "\n## Services\n{}", services.join(", "));
    }

    prompt.push_str(
        "\n## Response Format\n\
         Reply with a single JSON object and nothing else:\n\
         {\"score\": <number from 1.0 to 5.0>, \"reasoning\": \"<one paragraph>\", \
         \"strengths\": [\"<short finding>\", ...], \"weaknesses\": [\"<short finding>\", ...]}\n",
    );
    prompt
}

/// Extract and validate the verdict embedded in a text reply.
///
/// Malformed replies are permanent failures: asking again with the same
/// prompt is not expected to help.
pub fn parse_verdict(text: &str) -> Result<OracleVerdict, OracleFailure> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(OracleFailure::permanent(
                "reply contains no JSON object",
            ))
        }
    };

    let verdict: OracleVerdict = serde_json::from_str(json)
        .map_err(|e| OracleFailure::permanent(format!("unparseable verdict: {}", e)))?;
    verdict.validate()
}
