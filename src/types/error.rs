//! Unified Error Type System
//!
//! Centralized error types for the entire crate.
//! Provider errors carry the HTTP status code so the retry executor can
//! decide retryability without string matching.
//!
//! ## Design Principles
//!
//! - Single unified error type (ExamError) for the entire application
//! - Structured provider errors with status codes for retry decisions
//! - Parse errors are distinguishable so pipelines can degrade gracefully
//! - No panic/unwrap - all errors are recoverable

use thiserror::Error;

use crate::constants::retry::RETRYABLE_STATUSES;

// =============================================================================
// Provider Error
// =============================================================================

/// Error returned by a completion provider call.
///
/// `status` is the HTTP status code when the failure came from a response;
/// transport-level failures (connect errors, timeouts) carry no status and
/// are always treated as retryable.
#[derive(Debug, Clone)]
pub struct ProviderError {
    /// Provider that produced the error
    pub provider: String,
    /// HTTP status code, if the provider responded at all
    pub status: Option<u16>,
    /// Detailed error message
    pub message: String,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}:{}] {}", self.provider, status, self.message),
            None => write!(f, "[{}] {}", self.provider, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(
        provider: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// A failure is retryable when no status is available (network-level)
    /// or the status is one of the transient set.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => RETRYABLE_STATUSES.contains(&status),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ExamError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    /// A single provider call failed
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Both providers denied or exhausted. The message carries only the
    /// last underlying error; the individual attempts ride along so callers
    /// can still audit them.
    #[error("All completion providers are unavailable: {last_error}")]
    AllProvidersUnavailable {
        last_error: String,
        attempts: Vec<crate::types::domain::DispatchAttempt>,
    },

    /// Audio synthesis failed; terminal, never retried
    #[error("Audio synthesis failed: {0}")]
    AudioSynthesis(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    /// Structured-text parsing of a provider response failed.
    /// Never fatal to a submission; fatal to one generation batch.
    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    /// A submission carried zero answers; a percentage is undefined
    #[error("Submission contains no answers; score cannot be computed")]
    EmptySubmission,

    /// No performance tiers available for classification
    #[error("No performance tiers defined; cannot classify score")]
    NoTiers,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<ProviderError> for ExamError {
    fn from(err: ProviderError) -> Self {
        ExamError::Provider(err)
    }
}

impl ExamError {
    /// Create a parse error with context
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    /// True when this error represents a malformed provider response rather
    /// than a failed operation.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, ExamError>;

// =============================================================================
// Helper Functions
// =============================================================================

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ExamError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| ExamError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
