//! Audio Narration Pipeline
//!
//! Serves spoken narration for an assessment: a storage hit returns the
//! cached bytes, a miss synthesizes through the primary provider and stores
//! the result. Synthesis has no fallback provider and no retry; a failure
//! surfaces directly.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::llm::CompletionDispatcher;
use crate::storage::AudioStore;
use crate::types::Result;

pub struct AudioPipeline {
    dispatcher: Arc<CompletionDispatcher>,
    store: Arc<dyn AudioStore>,
}

impl AudioPipeline {
    pub fn new(dispatcher: Arc<CompletionDispatcher>, store: Arc<dyn AudioStore>) -> Self {
        Self { dispatcher, store }
    }

    /// Fetch or synthesize narration audio for a learner's assessment.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn narration(
        &self,
        learner_id: i64,
        assessment_id: i64,
        text: &str,
        language: &str,
    ) -> Result<Vec<u8>> {
        if let Some(bytes) = self.store.lookup(learner_id, assessment_id).await? {
            debug!(learner_id, assessment_id, "Serving stored narration");
            return Ok(bytes);
        }

        let bytes = self.dispatcher.generate_audio(text, language).await?;

        // Storing is best-effort; the synthesized bytes are still returned
        if let Err(err) = self.store.put(learner_id, assessment_id, &bytes).await {
            warn!(error = %err, "Failed to store narration audio");
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, CompletionDispatcher, CompletionProvider};
    use crate::storage::FsAudioStore;
    use crate::types::{ExamError, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct SpeakingProvider {
        synth_calls: AtomicU32,
    }

    #[async_trait]
    impl CompletionProvider for SpeakingProvider {
        async fn completion(&self, _: &str) -> std::result::Result<Completion, ProviderError> {
            Err(ProviderError::new("openai", "not used"))
        }

        fn name(&self) -> &str {
            "openai"
        }

        async fn synthesize_speech(&self, _text: &str, _language: &str) -> Result<Vec<u8>> {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            Ok(b"mp3 bytes".to_vec())
        }
    }

    fn pipeline(dir: &TempDir) -> (AudioPipeline, Arc<SpeakingProvider>) {
        let provider = Arc::new(SpeakingProvider {
            synth_calls: AtomicU32::new(0),
        });
        let dispatcher = Arc::new(CompletionDispatcher::new(
            provider.clone(),
            provider.clone(),
        ));
        let store = Arc::new(FsAudioStore::new(dir.path()));
        (AudioPipeline::new(dispatcher, store), provider)
    }

    #[tokio::test]
    async fn test_synthesizes_once_then_serves_from_store() {
        let dir = TempDir::new().unwrap();
        let (pipeline, provider) = pipeline(&dir);

        let first = pipeline.narration(1, 2, "hello", "en").await.unwrap();
        assert_eq!(first, b"mp3 bytes");
        assert_eq!(provider.synth_calls.load(Ordering::SeqCst), 1);

        let second = pipeline.narration(1, 2, "hello", "en").await.unwrap();
        assert_eq!(second, b"mp3 bytes");
        assert_eq!(provider.synth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_surfaces() {
        struct MuteProvider;

        #[async_trait]
        impl CompletionProvider for MuteProvider {
            async fn completion(&self, _: &str) -> std::result::Result<Completion, ProviderError> {
                Err(ProviderError::new("openai", "not used"))
            }

            fn name(&self) -> &str {
                "openai"
            }
        }

        let dir = TempDir::new().unwrap();
        let dispatcher = Arc::new(CompletionDispatcher::new(
            Arc::new(MuteProvider),
            Arc::new(MuteProvider),
        ));
        let store = Arc::new(FsAudioStore::new(dir.path()));
        let pipeline = AudioPipeline::new(dispatcher, store);

        let err = pipeline.narration(1, 2, "hello", "en").await.unwrap_err();
        assert!(matches!(err, ExamError::AudioSynthesis(_)));
    }
}
