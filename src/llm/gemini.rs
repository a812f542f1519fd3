//! Google Gemini Provider (Fallback)
//!
//! Text-completion backend used when the primary is unavailable. No speech
//! capability; audio requests never route here.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{Completion, CompletionProvider, ProviderConfig};
use crate::types::{ExamError, ProviderError, Result};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-pro";

/// Gemini provider with secure API key handling
pub struct GeminiProvider {
    api_key: SecretString,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("GOOGLE_GENAI_API_KEY").ok())
            .ok_or_else(|| {
                ExamError::Config(
                    "Gemini API key not found. Set GOOGLE_GENAI_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExamError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn completion(&self, prompt: &str) -> std::result::Result<Completion, ProviderError> {
        let start = Instant::now();
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base,
            self.model,
            self.api_key.expose_secret()
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        debug!(model = %self.model, "Sending generateContent request to Gemini");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError {
                provider: "genai".to_string(),
                status: e.status().map(|s| s.as_u16()),
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::with_status(
                "genai",
                status,
                format!("API error: {}", body),
            ));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::new("genai", format!("failed to decode response: {}", e))
        })?;

        let usage = body.usage_metadata.clone();
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::new("genai", "Empty response from GenAI"))?;

        Ok(Completion {
            text,
            usage,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn name(&self) -> &str {
        "genai"
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}
