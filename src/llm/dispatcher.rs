//! Completion Dispatcher
//!
//! The central resilience component: answers "generate text for this
//! prompt" by routing through the primary provider and falling back to the
//! secondary, with each provider guarded by its own circuit breaker and
//! retry policy.
//!
//! ## Strategy
//!
//! 1. If the primary breaker permits a call, run the primary through retry
//! 2. On success record breaker success and return, tagged with the
//!    provider name
//! 3. On failure (or breaker denial) fall through to the fallback under its
//!    own breaker and retry policy
//! 4. If both deny or both fail, surface a single aggregate error
//!
//! Audio synthesis is exposed only through the primary adapter; a failure
//! there is terminal and bypasses the breaker/retry machinery entirely.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::circuit_breaker::{BreakerConfig, BreakerStats, CircuitBreaker};
use super::retry::{RetryExecutor, RetryPolicy};
use super::{Completion, SharedProvider};
use crate::types::{DispatchAttempt, ExamError, ProviderError, Result};

/// Successful dispatch: the completion plus the provider that produced it,
/// ready to be persisted as a usage record. `attempts` holds every provider
/// call made along the way, failed retries and fallback included, in call
/// order with the successful one last.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub text: String,
    pub provider: String,
    pub usage: Option<Value>,
    pub latency_ms: u64,
    pub attempts: Vec<DispatchAttempt>,
}

impl DispatchResult {
    fn from_completion(
        completion: Completion,
        provider: &str,
        attempts: Vec<DispatchAttempt>,
    ) -> Self {
        Self {
            text: completion.text,
            provider: provider.to_string(),
            usage: completion.usage,
            latency_ms: completion.latency_ms,
            attempts,
        }
    }
}

/// Fault-tolerant dispatcher over the primary/fallback provider pair.
///
/// The two breakers are the only long-lived mutable state in the core; they
/// are owned here and shared by every concurrent request routed through
/// this dispatcher. Construct one dispatcher per process and clone the
/// `Arc` it is typically wrapped in.
pub struct CompletionDispatcher {
    primary: SharedProvider,
    fallback: SharedProvider,
    primary_breaker: CircuitBreaker,
    fallback_breaker: CircuitBreaker,
    primary_retry: RetryExecutor,
    fallback_retry: RetryExecutor,
}

impl CompletionDispatcher {
    /// Build a dispatcher with the default per-provider policies.
    pub fn new(primary: SharedProvider, fallback: SharedProvider) -> Self {
        let primary_name = primary.name().to_string();
        let fallback_name = fallback.name().to_string();
        Self {
            primary,
            fallback,
            primary_breaker: CircuitBreaker::new(primary_name, BreakerConfig::primary()),
            fallback_breaker: CircuitBreaker::new(fallback_name, BreakerConfig::fallback()),
            primary_retry: RetryExecutor::new(RetryPolicy::primary()),
            fallback_retry: RetryExecutor::new(RetryPolicy::fallback()),
        }
    }

    /// Build with explicit breaker configurations (used by tests and
    /// operators who need different thresholds).
    pub fn with_breaker_configs(
        primary: SharedProvider,
        fallback: SharedProvider,
        primary_config: BreakerConfig,
        fallback_config: BreakerConfig,
    ) -> Self {
        let primary_name = primary.name().to_string();
        let fallback_name = fallback.name().to_string();
        Self {
            primary,
            fallback,
            primary_breaker: CircuitBreaker::new(primary_name, primary_config),
            fallback_breaker: CircuitBreaker::new(fallback_name, fallback_config),
            primary_retry: RetryExecutor::new(RetryPolicy::primary()),
            fallback_retry: RetryExecutor::new(RetryPolicy::fallback()),
        }
    }

    /// Generate text with provider fallback.
    ///
    /// Fails only when both providers are exhausted or denied; the two
    /// distinct underlying errors are not both preserved, only the last.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn generate_text(&self, prompt: &str) -> Result<DispatchResult> {
        let mut last_error: Option<ProviderError> = None;
        let mut attempts: Vec<DispatchAttempt> = Vec::new();

        if self.primary_breaker.allow_request() {
            match self
                .run_with_retry(&self.primary, self.primary_retry, prompt, &mut attempts)
                .await
            {
                Ok(completion) => {
                    self.primary_breaker.record_success();
                    debug!(provider = %self.primary.name(), "Primary provider succeeded");
                    return Ok(DispatchResult::from_completion(
                        completion,
                        self.primary.name(),
                        attempts,
                    ));
                }
                Err(err) => {
                    self.primary_breaker.record_failure();
                    warn!(error = %err, "Primary provider failed");
                    last_error = Some(err);
                }
            }
        } else {
            warn!("Primary circuit breaker is OPEN, skipping to fallback");
        }

        if self.fallback_breaker.allow_request() {
            match self
                .run_with_retry(&self.fallback, self.fallback_retry, prompt, &mut attempts)
                .await
            {
                Ok(completion) => {
                    self.fallback_breaker.record_success();
                    info!(provider = %self.fallback.name(), "Fallback provider succeeded");
                    return Ok(DispatchResult::from_completion(
                        completion,
                        self.fallback.name(),
                        attempts,
                    ));
                }
                Err(err) => {
                    self.fallback_breaker.record_failure();
                    error!(error = %err, "Fallback provider failed");
                    last_error = Some(err);
                }
            }
        } else {
            warn!("Fallback circuit breaker is OPEN");
        }

        Err(ExamError::AllProvidersUnavailable {
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all circuit breakers are open".to_string()),
            attempts,
        })
    }

    /// Synthesize speech through the primary adapter. No fallback exists
    /// for audio; failures surface directly.
    pub async fn generate_audio(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        self.primary
            .synthesize_speech(text, language)
            .await
            .inspect_err(|err| error!(error = %err, "Audio generation failed"))
    }

    /// Breaker snapshots for monitoring: (primary, fallback).
    pub fn breaker_stats(&self) -> (BreakerStats, BreakerStats) {
        (self.primary_breaker.stats(), self.fallback_breaker.stats())
    }

    /// Run one provider through its retry policy, logging every call into
    /// `attempts` whether it succeeded or not.
    async fn run_with_retry(
        &self,
        provider: &SharedProvider,
        retry: RetryExecutor,
        prompt: &str,
        attempts: &mut Vec<DispatchAttempt>,
    ) -> std::result::Result<Completion, ProviderError> {
        let log: Arc<Mutex<Vec<DispatchAttempt>>> = Arc::new(Mutex::new(Vec::new()));
        let name = provider.name().to_string();

        let outcome = retry
            .execute(|| {
                let provider = Arc::clone(provider);
                let log = Arc::clone(&log);
                let name = name.clone();
                async move {
                    let started = Instant::now();
                    let result = provider.completion(prompt).await;
                    let attempt = match &result {
                        Ok(completion) => DispatchAttempt {
                            provider: name,
                            response_text: completion.text.clone(),
                            latency_ms: completion.latency_ms,
                            usage: completion.usage.clone(),
                            succeeded: true,
                        },
                        Err(err) => DispatchAttempt {
                            provider: name,
                            response_text: err.to_string(),
                            latency_ms: started.elapsed().as_millis() as u64,
                            usage: None,
                            succeeded: false,
                        },
                    };
                    log.lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(attempt);
                    result
                }
            })
            .await;

        attempts.extend(
            log.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .drain(..),
        );
        outcome
    }
}
