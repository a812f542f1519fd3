//! OpenAI API Provider (Primary)
//!
//! Chat-completions backend plus the speech-synthesis capability used for
//! audio summaries. Retries are disabled at the HTTP layer; the retry
//! executor owns that policy.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{Completion, CompletionProvider, ProviderConfig};
use crate::types::{ExamError, ProviderError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4-turbo";
const TTS_MODEL: &str = "gpt-4o-mini-tts";

/// Voice selection by language code; unrecognized codes fall back to the
/// default voice.
const VOICE_TABLE: &[(&str, &str)] = &[
    ("en", "coral"),
    ("hi", "coral"),
    ("kn", "alloy"),
    ("mr", "verse"),
];
const DEFAULT_VOICE: &str = "coral";

fn voice_for_language(language: &str) -> &'static str {
    VOICE_TABLE
        .iter()
        .find(|(code, _)| *code == language)
        .map(|(_, voice)| *voice)
        .unwrap_or(DEFAULT_VOICE)
}

/// OpenAI provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                ExamError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or provide in config"
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
            temperature: config.temperature,
            client,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn completion(&self, prompt: &str) -> std::result::Result<Completion, ProviderError> {
        let start = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        debug!(model = %self.model, "Sending chat completion request to OpenAI");

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ProviderError {
                    provider: "openai".to_string(),
                    status: e.status().map(|s| s.as_u16()),
                    message: format!("request failed: {}", e),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::with_status(
                "openai",
                status,
                format!("API error: {}", body),
            ));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            ProviderError::new("openai", format!("failed to decode response: {}", e))
        })?;

        let usage = body.usage.clone();
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::new("openai", "Empty response from OpenAI"))?;

        Ok(Completion {
            text,
            usage,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize_speech(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let voice = voice_for_language(language);
        let url = format!("{}/audio/speech", self.api_base);

        // The short extension keeps synthesized summaries from ending
        // abruptly on terse input.
        let enhanced = format!("{}. Add a small fresh extension in the same context.", text);

        let request = SpeechRequest {
            model: TTS_MODEL.to_string(),
            voice: voice.to_string(),
            input: enhanced,
            instructions: format!("Speak naturally in {} with a warm and friendly tone.", language),
        };

        debug!(voice, language, "Sending speech synthesis request to OpenAI");

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| ExamError::AudioSynthesis(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Speech synthesis failed");
            return Err(ExamError::AudioSynthesis(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExamError::AudioSynthesis(format!("failed to read audio body: {}", e)))?;

        Ok(bytes.to_vec())
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest {
    model: String,
    voice: String,
    input: String,
    instructions: String,
}
