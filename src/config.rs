/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/config.rs
*
* User configuration for the deploy CLI, read from a TOML file:
*
*   default_builder = "paketobuildpacks/builder:base"
*
*   [[additional_builders]]
*   vendor = "Acme"
*   image = "acme/builder:1"
*   description = "in-house builder"
*
*   [retry]
*   max_attempts = 5
*   initial_delay_ms = 10
*
* The file location is `$PH_APP_CONFIG`, falling back to
* `$HOME/.ph/config.toml`. A missing file yields the defaults.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::builder::BuilderInfo;
use crate::error::{Error, Result};
use crate::retry::RetryConfig;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_builder: Option<String>,
    pub additional_builders: Vec<BuilderInfo>,
    pub retry: RetrySettings,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::conflict_default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PH_APP_CONFIG") {
            return Some(PathBuf::from(path));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| Path::new(&home).join(".ph").join("config.toml"))
    }

    /// Loads the configuration from `path`, or from the default location
    /// when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Self::parse(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        if config.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            ..RetryConfig::conflict_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            default_builder = "paketobuildpacks/builder:base"

            [[additional_builders]]
            vendor = "Acme"
            image = "acme/builder:1"
            description = "in-house builder"

            [retry]
            max_attempts = 3
            initial_delay_ms = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.default_builder.as_deref(), Some("paketobuildpacks/builder:base"));
        assert_eq!(config.additional_builders.len(), 1);
        assert_eq!(config.additional_builders[0].vendor, "Acme");

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(25));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry_config().max_attempts, RetryConfig::conflict_default().max_attempts);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(Config::parse("[retry]\nmax_attempts = 0\n").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config, Config::default());
    }
}
