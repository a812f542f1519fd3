//! Audio Storage
//!
//! Synthesized narration is stored once per learner/assessment pair and
//! served from storage on subsequent requests. The trait keeps the pipeline
//! independent of where the bytes actually live.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::types::Result;

/// Content-addressed store for synthesized audio.
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Persist audio bytes for a learner's assessment, returning a stable
    /// locator for later retrieval.
    async fn put(&self, learner_id: i64, assessment_id: i64, bytes: &[u8]) -> Result<String>;

    /// Fetch previously stored audio, if any.
    async fn lookup(&self, learner_id: i64, assessment_id: i64) -> Result<Option<Vec<u8>>>;
}

/// Filesystem-backed audio store. Files are laid out as
/// `<root>/<learner_id>/<assessment_id>.mp3`.
pub struct FsAudioStore {
    root: PathBuf,
}

impl FsAudioStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, learner_id: i64, assessment_id: i64) -> PathBuf {
        self.root
            .join(learner_id.to_string())
            .join(format!("{}.mp3", assessment_id))
    }
}

#[async_trait]
impl AudioStore for FsAudioStore {
    async fn put(&self, learner_id: i64, assessment_id: i64, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(learner_id, assessment_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Stored audio");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn lookup(&self, learner_id: i64, assessment_id: i64) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(learner_id, assessment_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
