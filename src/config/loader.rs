//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// `${VAR}` placeholders are expanded before parsing, then `API_KEY`,
    /// `ENDPOINT` and `ALBUM` override the upstream section.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let mut config: Config = serde_yaml::from_str(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus the environment
    pub fn from_env() -> Result<Config, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a dotenv-style file into the process environment.
    ///
    /// Variables already set are left alone. Returns `false` when the file
    /// could not be loaded; that is never fatal.
    pub fn load_dotenv(path: Option<&Path>) -> bool {
        let result = match path {
            Some(path) => dotenvy::from_path(path).map(|_| ()),
            None => dotenvy::dotenv().map(|_| ()),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Error loading .env file");
                false
            }
        }
    }
}
