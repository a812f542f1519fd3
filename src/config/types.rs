//! Configuration Types
//!
//! All configuration structures with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::provider;
use crate::types::ExamError;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Database settings
    pub database: DatabaseConfig,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Audio storage settings
    pub audio: AudioConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ExamError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ExamError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(ExamError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.database.pool_size == 0 {
            return Err(ExamError::Config(
                "Database pool_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: PathBuf,

    /// Connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("examloom.db"),
            pool_size: 8,
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Primary provider model
    pub primary_model: String,

    /// Fallback provider model
    pub fallback_model: String,

    /// Sampling temperature for completions
    pub temperature: f32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary_model: "gpt-4-turbo".to_string(),
            fallback_model: "gemini-pro".to_string(),
            temperature: provider::DEFAULT_TEMPERATURE,
            timeout_secs: provider::REQUEST_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Audio Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory where synthesized audio files are stored
    pub dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("audio"),
        }
    }
}
