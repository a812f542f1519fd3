//! Provider Response Parsers
//!
//! Converts raw free-text completions into the structured shapes the
//! pipelines persist. Models wrap JSON in markdown fences and prose often
//! enough that extraction has to tolerate both.
//!
//! Parse failures are ordinary errors here; the calling pipeline decides
//! whether they are fatal (one generation batch) or degradable (the
//! narrative evaluation of a submission).

mod evaluation;
mod mcq;

pub use evaluation::{EvaluationReport, QuestionEvaluation, SelectedAnswer, parse_evaluation};
pub use mcq::{McqBatch, ParsedQuestion, parse_mcq_batch};

use serde_json::Value;
use tracing::debug;

use crate::types::{ExamError, Result};

/// Extract and parse the JSON payload from an LLM response.
///
/// Handles markdown code fences, a BOM, and JSON embedded in surrounding
/// explanatory text.
pub fn extract_json(raw: &str, context: &str) -> Result<Value> {
    let cleaned = preprocess(raw);

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }

    debug!(context, "Direct JSON parse failed, scanning for embedded JSON");

    if let Some(embedded) = extract_from_mixed(&cleaned)
        && let Ok(value) = serde_json::from_str::<Value>(embedded)
    {
        return Ok(value);
    }

    Err(ExamError::parse(
        context,
        format!(
            "no parseable JSON in response; preview: {}",
            cleaned.chars().take(120).collect::<String>()
        ),
    ))
}

fn preprocess(raw: &str) -> String {
    let mut s = raw.trim();
    s = s.trim_start_matches('\u{feff}');

    let mut out = s.to_string();
    if out.starts_with("```")
        && let Some(first_newline) = out.find('\n')
    {
        out = out[first_newline + 1..].to_string();
    }
    if out.ends_with("```") {
        out = out[..out.len() - 3].trim_end().to_string();
    }

    out.trim().to_string()
}

/// Find the first balanced JSON object or array in mixed content.
fn extract_from_mixed(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let bytes = s.as_bytes();
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
