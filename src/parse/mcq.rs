//! MCQ Batch Parser
//!
//! Parses a generation completion into a structured question batch:
//! `{question, options: {1..N: text}, correctOption, difficulty?, topic?,
//! language?}` entries, either as a bare array or under a `questions` key.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::extract_json;
use crate::types::{ExamError, Result};

/// One question as produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedQuestion {
    pub question: String,
    /// Option number (1-based) to option text, ordered
    #[serde(deserialize_with = "numbered_options")]
    pub options: BTreeMap<u32, String>,
    #[serde(rename = "correctOption", deserialize_with = "lenient_u32")]
    pub correct_option: u32,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A parsed batch of generated questions.
#[derive(Debug, Clone)]
pub struct McqBatch {
    pub questions: Vec<ParsedQuestion>,
}

/// Parse the raw completion text into a question batch.
pub fn parse_mcq_batch(raw: &str) -> Result<McqBatch> {
    let value = extract_json(raw, "mcq batch")?;

    let items = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map
            .remove("questions")
            .or_else(|| map.remove("evaluations"))
            .ok_or_else(|| {
                ExamError::parse("mcq batch", "object has no questions array")
            })?,
        other => {
            return Err(ExamError::parse(
                "mcq batch",
                format!("expected array or object, got {}", type_name(&other)),
            ));
        }
    };

    let questions: Vec<ParsedQuestion> = serde_json::from_value(items)
        .map_err(|e| ExamError::parse("mcq batch", e.to_string()))?;

    if questions.is_empty() {
        return Err(ExamError::parse("mcq batch", "batch contains no questions"));
    }

    Ok(McqBatch { questions })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Models emit option numbers and correct-option markers as either numbers
/// or strings; accept both.
fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n as u32)
            .ok_or_else(|| serde::de::Error::custom("option number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("invalid option number: {}", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected option number, got {}",
            type_name(&other)
        ))),
    }
}

fn numbered_options<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<u32, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, text)| {
            key.trim()
                .parse::<u32>()
                .map(|n| (n, text))
                .map_err(|_| serde::de::Error::custom(format!("invalid option key: {}", key)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"{
        "questions": [
            {
                "question": "What does a circuit breaker guard against?",
                "options": {"1": "Slow tests", "2": "Cascading failures", "3": "Disk usage", "4": "Linting"},
                "correctOption": 2,
                "difficulty": "medium",
                "topic": "resilience",
                "language": "en"
            }
        ]
    }"#;

    #[test]
    fn test_parse_batch_object() {
        let batch = parse_mcq_batch(BATCH).unwrap();
        assert_eq!(batch.questions.len(), 1);
        let q = &batch.questions[0];
        assert_eq!(q.correct_option, 2);
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.options[&2], "Cascading failures");
    }

    #[test]
    fn test_parse_bare_array() {
        let raw = r#"[{"question": "Q?", "options": {"1": "a", "2": "b"}, "correctOption": "1"}]"#;
        let batch = parse_mcq_batch(raw).unwrap();
        assert_eq!(batch.questions[0].correct_option, 1);
        assert!(batch.questions[0].difficulty.is_none());
    }

    #[test]
    fn test_parse_fenced_batch() {
        let raw = format!("```json\n{}\n```", BATCH);
        assert!(parse_mcq_batch(&raw).is_ok());
    }

    #[test]
    fn test_string_correct_option_accepted() {
        let raw = r#"[{"question": "Q?", "options": {"1": "a"}, "correctOption": " 1 "}]"#;
        let batch = parse_mcq_batch(raw).unwrap();
        assert_eq!(batch.questions[0].correct_option, 1);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = parse_mcq_batch(r#"{"questions": []}"#).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_missing_questions_key_rejected() {
        let err = parse_mcq_batch(r#"{"items": []}"#).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_options_preserve_numeric_order() {
        let raw = r#"[{"question": "Q?", "options": {"10": "j", "2": "b", "1": "a"}, "correctOption": 1}]"#;
        let batch = parse_mcq_batch(raw).unwrap();
        let numbers: Vec<u32> = batch.questions[0].options.keys().copied().collect();
        assert_eq!(numbers, vec![1, 2, 10]);
    }
}
