//! Global Constants
//!
//! Centralized constants for resilience policy and generation tuning.
//! All magic numbers should be defined here with documentation.

/// Circuit breaker policies, one per provider role
pub mod circuit_breaker {
    /// Failures within the monitor window before the primary circuit opens
    pub const PRIMARY_FAILURE_THRESHOLD: usize = 5;

    /// Duration the primary circuit stays open before a trial call (seconds)
    pub const PRIMARY_RESET_TIMEOUT_SECS: u64 = 30;

    /// Failures within the monitor window before the fallback circuit opens
    ///
    /// Stricter than the primary: the fallback is a last resort and earns
    /// less trust.
    pub const FALLBACK_FAILURE_THRESHOLD: usize = 3;

    /// Duration the fallback circuit stays open before a trial call (seconds)
    pub const FALLBACK_RESET_TIMEOUT_SECS: u64 = 45;

    /// Rolling window over which failures are counted (seconds)
    pub const MONITOR_WINDOW_SECS: u64 = 60;
}

/// Retry policy constants
pub mod retry {
    /// Maximum retries for the primary provider (3 attempts total)
    pub const PRIMARY_MAX_RETRIES: u32 = 2;

    /// Maximum retries for the fallback provider (2 attempts total)
    pub const FALLBACK_MAX_RETRIES: u32 = 1;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Maximum random jitter added to each backoff delay (milliseconds)
    pub const MAX_JITTER_MS: u64 = 500;

    /// Cap on any single backoff delay (milliseconds)
    pub const MAX_DELAY_MS: u64 = 5000;

    /// HTTP status codes worth retrying; everything else aborts immediately
    pub const RETRYABLE_STATUSES: &[u16] = &[408, 421, 429, 500, 502, 503, 504];
}

/// Question generation constants
pub mod generation {
    /// Over-generation factor applied to the requested question count.
    ///
    /// The buffer absorbs questions later rejected by review or filtering,
    /// so the learner-facing count survives attrition.
    pub const QUESTION_BUFFER_FACTOR: f64 = 2.25;
}

/// Provider request constants
pub mod provider {
    /// Fixed request timeout for provider HTTP calls (seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Temperature used for MCQ and evaluation completions
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
}
