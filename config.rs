//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating cryptcopy
//! settings from JSON files and environment variables.
//!
//! ## Environment Variables
//!
//! - `CRYPTCOPY_PUBLIC_KEY`: Override public (encryption) key path
//! - `CRYPTCOPY_PRIVATE_KEY`: Override private (decryption) key path
//! - `CRYPTCOPY_READ_SIZE`: Override the source read size in bytes
//! - `CRYPTCOPY_CONFIG`: Override config file path

use crate::exclude::Excludes;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_PUBLIC_KEY: &str = "CRYPTCOPY_PUBLIC_KEY";
pub const ENV_PRIVATE_KEY: &str = "CRYPTCOPY_PRIVATE_KEY";
pub const ENV_READ_SIZE: &str = "CRYPTCOPY_READ_SIZE";
pub const ENV_CONFIG_PATH: &str = "CRYPTCOPY_CONFIG";

/// Value of `name`, or `default` when unset or not valid unicode.
pub fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub public_key_path: String,
    pub private_key_path: String,
    /// Bytes per source read; encryption reads are further capped by the key
    pub read_size: Option<usize>,
    /// Paths or names containing any of these strings are skipped
    pub excludes: Vec<String>,
    /// Paths or names matching any of these regexes are skipped
    pub exclude_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_key_path: "./public.pem".to_string(),
            private_key_path: "./private.pem".to_string(),
            read_size: None,
            excludes: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config =
            serde_json::from_str(&s).with_context(|| format!("parsing config file {}", path))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s).with_context(|| format!("parsing config file {}", p))?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.public_key_path = env_or(ENV_PUBLIC_KEY, &self.public_key_path);
        self.private_key_path = env_or(ENV_PRIVATE_KEY, &self.private_key_path);

        if let Ok(read_size) = env::var(ENV_READ_SIZE) {
            debug!(read_size = %read_size, "overriding read_size from environment");
            self.read_size = Some(
                read_size
                    .parse()
                    .with_context(|| format!("{} must be a byte count", ENV_READ_SIZE))?,
            );
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.public_key_path.trim().is_empty() {
            anyhow::bail!("public_key_path cannot be empty");
        }

        if self.private_key_path.trim().is_empty() {
            anyhow::bail!("private_key_path cannot be empty");
        }

        if self.read_size == Some(0) {
            anyhow::bail!("read_size must be greater than zero");
        }

        // Fail early on bad regexes instead of at the first copy
        self.excludes().context("invalid exclude_patterns")?;

        if self.public_key_path == self.private_key_path {
            warn!(
                path = %self.private_key_path,
                "public and private key paths are identical; the private key will be used for encryption"
            );
        }

        Ok(())
    }

    /// Build the exclusion list from `excludes` and `exclude_patterns`.
    pub fn excludes(&self) -> crate::Result<Excludes> {
        Excludes::from_parts(self.excludes.iter().cloned(), &self.exclude_patterns)
    }

    /// Create a new config with explicit key paths
    pub fn new(public_key_path: impl Into<String>, private_key_path: impl Into<String>) -> Self {
        Self {
            public_key_path: public_key_path.into(),
            private_key_path: private_key_path.into(),
            ..Default::default()
        }
    }
}
