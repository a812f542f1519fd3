//! Shared Types
//!
//! Domain entities and the unified error type used across the crate.

pub mod domain;
pub mod error;

pub use domain::{
    AnswerInput, Assessment, DispatchAttempt, GeneratedQuestion, NewAssessment, PerformanceTier,
    ProviderUsageRecord, QuestionOption, QuestionWithOptions, SubmissionAnswer, SubmissionOutcome,
    TierAssignment,
};
pub use error::{ExamError, ProviderError, Result, ResultExt};
