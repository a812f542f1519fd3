//! Domain Model
//!
//! Row-shaped entities flowing between the pipelines and storage.
//! `PerformanceTier` and `Assessment` are reference data owned by the
//! surrounding service; everything else is produced by the pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named band of the score axis with descriptive text and a scoring
/// hardship modifier. Tiers partition [0,100] without gaps when curated
/// correctly; the top tier has an open upper bound and the bottom tier an
/// open lower bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceTier {
    pub id: i64,
    /// Ordered grade token, e.g. "A+".."E"
    pub grade: String,
    /// Human-readable range, e.g. ">= 90" or "80-89"
    pub score_range: String,
    pub score_min: Option<i32>,
    pub score_max: Option<i32>,
    /// Scoring modifier such as "+20%"
    pub hardship: Option<String>,
    pub meaning: Option<String>,
}

impl PerformanceTier {
    /// Difficulty-calibration text handed to prompt construction.
    pub fn description(&self) -> String {
        match &self.meaning {
            Some(meaning) if !meaning.is_empty() => meaning.clone(),
            _ => format!("{} — {}", self.grade, self.score_range),
        }
    }
}

/// An assessment definition. Read-only to this core after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    /// Learner cohort this assessment belongs to
    pub cohort_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub topics: Vec<String>,
    pub requested_question_count: u32,
    /// Always floor(requested * 2.25); enforced at creation time
    pub buffered_question_count: u32,
}

/// Input for creating an assessment; the buffered count is derived, never
/// supplied.
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub cohort_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub topics: Vec<String>,
    pub requested_question_count: u32,
}

/// A generated multiple-choice question row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub id: i64,
    pub assessment_id: i64,
    pub question: String,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub language: Option<String>,
}

/// One answer option for a question, keyed by its 1-based option number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub option_number: u32,
    pub option_text: String,
}

/// A question with its options and resolved correct option, as read back
/// from storage for corpus context or learner delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithOptions {
    #[serde(flatten)]
    pub question: GeneratedQuestion,
    pub options: Vec<QuestionOption>,
    pub correct_option: Option<QuestionOption>,
}

/// A learner's answer to one question, as submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerInput {
    pub question_id: i64,
    pub chosen_option_id: i64,
}

/// Persisted answer row; created once, never mutated.
#[derive(Debug, Clone)]
pub struct SubmissionAnswer {
    pub learner_id: i64,
    pub assessment_id: i64,
    pub question_id: i64,
    pub chosen_option_id: i64,
    pub answered_at: DateTime<Utc>,
}

/// One tier assignment per submission; drives which future prompt batch the
/// learner is shown.
#[derive(Debug, Clone)]
pub struct TierAssignment {
    pub learner_id: i64,
    pub assessment_id: i64,
    pub tier_id: i64,
    pub assigned_at: DateTime<Utc>,
}

/// One provider call observed during a dispatch. Failed calls are kept so
/// the audit trail shows every attempt, not just the one that answered.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub provider: String,
    /// Completion text on success, error text on failure
    pub response_text: String,
    pub latency_ms: u64,
    pub usage: Option<Value>,
    pub succeeded: bool,
}

/// Append-only audit row, one per dispatch attempt, fallback and failed
/// attempts included.
#[derive(Debug, Clone)]
pub struct ProviderUsageRecord {
    pub assessment_id: i64,
    pub provider: String,
    pub prompt: String,
    pub response_text: String,
    pub latency_ms: u64,
    pub usage: Option<Value>,
}

/// Caller-facing result of a submission: grading is always definitive, the
/// narrative evaluation is best-effort.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub total_questions: usize,
    /// Correct-answer count, 2-decimal rounded. The percentage derived from
    /// it drives tier classification but is not part of this contract.
    pub score: f64,
    pub tier_grade: String,
    pub tier_meaning: Option<String>,
    pub hardship: Option<String>,
    pub evaluation: Option<crate::parse::EvaluationReport>,
    pub raw_evaluation_text: Option<String>,
    pub parse_error: Option<String>,
}
