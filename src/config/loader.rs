//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Config file (examloom.toml in the working directory)
//! 3. Environment variables (EXAMLOOM_* prefix)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::Config;
use crate::types::{ExamError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with the full resolution chain:
    /// defaults → examloom.toml → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        let config_path = Self::config_path();
        if config_path.exists() {
            debug!("Loading config from: {}", config_path.display());
            figment = figment.merge(Toml::file(&config_path));
        }

        // Double underscore nests; single underscore stays in the key,
        // e.g. EXAMLOOM_LLM__PRIMARY_MODEL -> llm.primary_model
        figment = figment.merge(Env::prefixed("EXAMLOOM_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| ExamError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ExamError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Path to the config file in the working directory
    pub fn config_path() -> PathBuf {
        PathBuf::from("examloom.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_default_config() {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[llm]
primary_model = "gpt-4o"
temperature = 0.2
"#
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.llm.primary_model, "gpt-4o");
        assert_eq!(config.llm.temperature, 0.2);
        // Untouched sections keep their defaults
        assert_eq!(config.database.pool_size, 8);
    }

    #[test]
    fn test_env_overrides_multiword_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("EXAMLOOM_LLM__PRIMARY_MODEL", "gpt-4o-mini");
            jail.set_env("EXAMLOOM_DATABASE__POOL_SIZE", "3");

            let config =
                ConfigLoader::load().map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.llm.primary_model, "gpt-4o-mini");
            assert_eq!(config.database.pool_size, 3);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_config_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\ntimeout_secs = 0").unwrap();
        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }
}
