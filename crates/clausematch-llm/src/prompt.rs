use std::fmt::Write as _;

use clausematch_core::types::AdjudicationRequest;

pub const SYSTEM_PROMPT: &str = "You compare clauses of a submitted contract against articles of a standard \
contract. Judge whether they address the same subject, not whether the wording or legal force is identical. \
Answer with JSON only.";

const INSTRUCTIONS: &str = r#"For each candidate article decide whether the user clause covers the same subject.

Treat as a match:
- different wording for the same obligation ("warrants quality" vs "endeavours to maintain quality")
- a narrower or broader statement of the same topic

Treat as no match:
- the same keyword with a different substance (termination for insolvency vs termination for late payment)
- the same topic seen from the other party (provider's warranty vs user's duty)

Reply with exactly this shape and one entry per candidate:
{"verdicts": [{"article_id": "...", "is_match": true, "confidence": 0.0, "rationale": "..."}]}
confidence is between 0 and 1."#;

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn build_user_prompt(request: &AdjudicationRequest, max_excerpt_chars: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## User clause {}\n{}\n", request.clause_number, request.clause_text.trim());
    out.push_str("## Candidate standard articles\n");
    for (i, c) in request.candidates.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n### Candidate {} (article_id: {})\nTitle: {}\nRetrieval score: {:.3}, supporting sub-items: {}",
            i + 1,
            c.article_id,
            c.title,
            c.score.value(),
            c.supporting_sub_items
        );
        for excerpt in &c.excerpts {
            let _ = writeln!(out, "- {}", truncate_chars(excerpt.trim(), max_excerpt_chars));
        }
    }
    out.push('\n');
    out.push_str(INSTRUCTIONS);
    out
}
