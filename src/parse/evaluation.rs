//! Evaluation Report Parser
//!
//! Parses the free-text answer evaluation into per-question explanations
//! plus a shared summary and recommendations. The submission pipeline
//! treats failures here as degradable, never fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract_json;
use crate::types::{ExamError, Result};

/// The learner's selected option as echoed back by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedAnswer {
    pub id: i64,
}

/// The model's evaluation of one answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEvaluation {
    /// Question id, echoed from the prompt
    pub id: i64,
    pub question: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Option number to text, as shown to the learner
    pub options: Value,
    #[serde(rename = "selectedAnswerByStudent")]
    pub selected_answer: SelectedAnswer,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// A fully parsed evaluation: per-question explanations plus the shared
/// narrative fields denormalized onto every persisted row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluations: Vec<QuestionEvaluation>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
}

/// Parse the raw completion text into an evaluation report.
///
/// A report with no evaluations is rejected; there is nothing to persist
/// and the caller should fall back to the raw text.
pub fn parse_evaluation(raw: &str) -> Result<EvaluationReport> {
    let value = extract_json(raw, "evaluation report")?;

    let report: EvaluationReport = serde_json::from_value(value)
        .map_err(|e| ExamError::parse("evaluation report", e.to_string()))?;

    if report.evaluations.is_empty() {
        return Err(ExamError::parse(
            "evaluation report",
            "no evaluations found in response",
        ));
    }

    Ok(report)
}
