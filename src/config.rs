use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable consulted before the config file for the API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub model: Option<String>,
    pub reviews_path: Option<String>,
}

impl Config {
    /// Load the config file, falling back to defaults when it is missing
    /// or unreadable. A broken config never blocks startup.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                warn!("could not load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn try_load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn save_api_key(key: &str) -> Result<()> {
        let mut config = Self::load();
        config.gemini_api_key = Some(key.to_string());
        config.save()
    }

    /// The API key, checking the environment first, then the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(std::env::var(API_KEY_ENV).ok(), self)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("could not determine config directory"))?;

        Ok(config_dir.join("profchat").join("config.json"))
    }
}

fn resolve_key(env_key: Option<String>, config: &Config) -> Option<String> {
    env_key
        .filter(|key| !key.is_empty())
        .or_else(|| config.gemini_api_key.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(key: &str) -> Config {
        Config {
            gemini_api_key: Some(key.to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_env_key_wins_over_config() {
        let key = resolve_key(Some("env-key".to_string()), &stored("file-key"));
        assert_eq!(key.as_deref(), Some("env-key"));
    }

    #[test]
    fn test_empty_env_key_falls_back_to_config() {
        let key = resolve_key(Some(String::new()), &stored("file-key"));
        assert_eq!(key.as_deref(), Some("file-key"));
    }

    #[test]
    fn test_missing_everywhere_is_none() {
        assert_eq!(resolve_key(None, &Config::default()), None);
    }

    #[test]
    fn test_partial_config_files_parse() {
        // hand-edited files may omit fields
        let config: Config = serde_json::from_str(r#"{"model": "gemini-1.5-pro"}"#).unwrap();
        assert_eq!(config.model.as_deref(), Some("gemini-1.5-pro"));
        assert!(config.gemini_api_key.is_none());
        assert!(config.reviews_path.is_none());
    }
}
