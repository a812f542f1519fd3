//! Examloom - Adaptive Assessment Engine
//!
//! Generates tier-calibrated multiple-choice assessments with LLMs, grades
//! submissions, and assigns learners to performance tiers. The dispatch
//! layer keeps the whole thing alive when a provider degrades: per-provider
//! circuit breakers, bounded retry with jittered backoff, and automatic
//! primary-to-fallback failover.
//!
//! ## Core Features
//!
//! - **Resilient Dispatch**: circuit breakers and retry around two backends
//! - **Adaptive Generation**: one question batch per performance tier,
//!   seeded with the cohort's prior questions as negative examples
//! - **Transactional Grading**: answers, tier assignment, and completion
//!   commit atomically; the narrative evaluation is best-effort
//! - **Audio Narration**: synthesize-once speech with filesystem caching
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use examloom::{
//!     CompletionDispatcher, Database, GenerationPipeline, OpenAiProvider,
//!     GeminiProvider, ProviderConfig,
//! };
//!
//! let db = Arc::new(Database::open("examloom.db")?);
//! db.initialize()?;
//!
//! let dispatcher = Arc::new(CompletionDispatcher::new(
//!     Arc::new(OpenAiProvider::new(ProviderConfig::default())?),
//!     Arc::new(GeminiProvider::new(ProviderConfig::default())?),
//! ));
//!
//! let pipeline = GenerationPipeline::new(dispatcher, db);
//! let summary = pipeline.generate_for_assessment(assessment_id).await?;
//! ```
//!
//! ## Modules
//!
//! - [`llm`]: provider abstraction, circuit breakers, retry, dispatch
//! - [`pipeline`]: generation, submission, and audio operations
//! - [`grading`]: scoring and tier classification
//! - [`parse`]: structured extraction from free-text completions
//! - [`prompt`]: prompt construction
//! - [`storage`]: SQLite persistence and the audio store
//! - [`config`]: layered configuration

pub mod config;
pub mod constants;
pub mod grading;
pub mod llm;
pub mod logging;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{ExamError, ProviderError, Result, ResultExt};

// Domain
pub use types::{
    AnswerInput, Assessment, DispatchAttempt, NewAssessment, PerformanceTier,
    QuestionWithOptions, SubmissionOutcome,
};

// Storage
pub use storage::{AudioStore, Database, FsAudioStore, SharedDatabase};

// =============================================================================
// LLM Re-exports
// =============================================================================

pub use llm::{
    BreakerConfig,
    BreakerStats,
    CircuitBreaker,
    CircuitState,
    Completion,
    CompletionDispatcher,
    CompletionProvider,
    DispatchResult,
    GeminiProvider,
    OpenAiProvider,
    ProviderConfig,
    RetryExecutor,
    RetryPolicy,
    SharedProvider,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{AudioPipeline, GenerationPipeline, GenerationSummary, SubmissionPipeline};
