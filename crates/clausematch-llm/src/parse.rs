//! Reply parsing. Anything the model returns that does not fit the verdict
//! shape is a transient failure: the same prompt usually succeeds on retry.

use serde::Deserialize;

use clausematch_core::error::{Error, Result};
use clausematch_core::types::Verdict;
use clausematch_core::Score;

#[derive(Debug, Deserialize)]
struct Reply {
    verdicts: Vec<RawVerdict>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    article_id: String,
    is_match: bool,
    confidence: f64,
    #[serde(default, alias = "reasoning")]
    rationale: String,
}

/// Extracts verdicts from the model's message content. A reply fenced in a
/// markdown code block is accepted.
pub fn parse_verdicts(content: &str) -> Result<Vec<Verdict>> {
    let body = strip_fence(content.trim());
    let reply: Reply = serde_json::from_str(body)
        .map_err(|e| Error::adjudication(format!("malformed adjudicator reply: {e}"), true))?;
    reply
        .verdicts
        .into_iter()
        .map(|v| {
            if !v.confidence.is_finite() {
                return Err(Error::adjudication(format!("non-finite confidence for {}", v.article_id), true));
            }
            let clamped = v.confidence.clamp(0.0, 1.0);
            if (clamped - v.confidence).abs() > f64::EPSILON {
                tracing::debug!(article_id = %v.article_id, confidence = v.confidence, "confidence clamped into [0, 1]");
            }
            Ok(Verdict {
                article_id: v.article_id,
                is_match: v.is_match,
                confidence: Score::new(clamped),
                rationale: v.rationale,
            })
        })
        .collect()
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
