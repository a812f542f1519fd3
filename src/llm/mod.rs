//! Completion Provider Layer
//!
//! Uniform capability surface over the two concrete completion backends and
//! the resilience machinery that dispatches to them.
//!
//! ## Modules
//!
//! - `circuit_breaker`: per-provider failure-tracking state machine
//! - `retry`: bounded retry with exponential backoff and jitter
//! - `dispatcher`: primary/fallback orchestration on top of both
//! - `openai`: primary backend (chat completions + speech synthesis)
//! - `gemini`: fallback backend (text completions only)

pub mod circuit_breaker;
pub mod dispatcher;
pub mod gemini;
pub mod openai;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitState};
pub use dispatcher::{CompletionDispatcher, DispatchResult};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use retry::{RetryExecutor, RetryPolicy};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::provider as provider_constants;
use crate::types::{ExamError, ProviderError, Result};

// =============================================================================
// Completion Response
// =============================================================================

/// One completed provider call: the generated text plus the audit metadata
/// that flows into provider-usage records.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text; providers fail rather than return an empty body
    pub text: String,
    /// Raw token-usage payload as reported by the provider, if any
    pub usage: Option<Value>,
    /// Wall-clock latency of the provider call
    pub latency_ms: u64,
}

// =============================================================================
// Provider Trait
// =============================================================================

/// A completion backend. Implementations must fail when the response
/// carries no text; callers rely on `Completion.text` being non-empty.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a text completion for the prompt.
    async fn completion(&self, prompt: &str) -> std::result::Result<Completion, ProviderError>;

    /// Provider name for logging and usage records
    fn name(&self) -> &str;

    /// Synthesize speech for the text in the given language.
    ///
    /// Only the primary backend supports this; the default implementation
    /// reports the capability as unavailable.
    async fn synthesize_speech(&self, _text: &str, _language: &str) -> Result<Vec<u8>> {
        Err(ExamError::AudioSynthesis(format!(
            "{} does not support speech synthesis",
            self.name()
        )))
    }
}

/// Shared provider handle for concurrent use across pipelines.
pub type SharedProvider = Arc<dyn CompletionProvider>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one completion backend.
///
/// API keys are never serialized to output and are redacted in debug
/// output; each provider converts the key to a SecretString internally.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model name (provider-specific default applies when unset)
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// API key; falls back to the provider's environment variable
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// API base URL override (for proxies and test servers)
    #[serde(default)]
    pub api_base: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: None,
            timeout_secs: provider_constants::REQUEST_TIMEOUT_SECS,
            temperature: provider_constants::DEFAULT_TEMPERATURE,
            api_key: None,
            api_base: None,
        }
    }
}
