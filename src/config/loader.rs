//! Configuration loading functionality
//!
//! Configuration is layered, lowest priority first:
//! 1. Default values (serde defaults)
//! 2. Configuration file (JSON)
//! 3. Environment variables prefixed with `PORT_SELECTOR_`
//! 4. Command line overrides

use config::{Config, Environment, File, FileFormat};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::{self, ENV_PREFIX, ENV_PREFIX_SEPARATOR, ENV_SEPARATOR};
use super::SelectorConfig;
use crate::common::{Network, Result, SelectorError};
use crate::protocol::MatchMode;

/// Command line values that take precedence over every other source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub network: Option<Network>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub header_size: Option<usize>,
    pub match_mode: Option<MatchMode>,
    pub peek_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// Apply every value that was given
    pub fn apply(&self, config: &mut SelectorConfig) {
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(host) = &self.host {
            config.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(header_size) = self.header_size {
            config.header_size = header_size;
        }
        if let Some(match_mode) = self.match_mode {
            config.match_mode = match_mode;
        }
        if let Some(peek_timeout_ms) = self.peek_timeout_ms {
            config.peek_timeout_ms = peek_timeout_ms;
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }
    }
}

impl SelectorConfig {
    /// Parse a configuration from a JSON document
    ///
    /// Missing fields take their default values.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| SelectorError::Config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Load configuration from a JSON file only
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SelectorError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SelectorError::Config(format!(
                "Failed to parse JSON config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from a file and the environment
    ///
    /// An explicitly given file must exist. Without one, `config.json` in
    /// the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(defaults::DEFAULT_CONFIG_FILE), false),
        };

        if path.exists() {
            info!("Using configuration file: {}", path.display());
        } else if required {
            return Err(SelectorError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        } else {
            debug!(
                "Configuration file {} not found, using defaults and environment",
                path.display()
            );
        }

        let settings = Config::builder()
            .add_source(File::from(path.clone()).format(FileFormat::Json).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_PREFIX_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SelectorError::Config(format!("Failed to load configuration: {}", e)))?;

        settings
            .try_deserialize::<Self>()
            .map_err(|e| SelectorError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Load, override and validate in one step
    ///
    /// Warnings from [`SelectorConfig::check`] are logged, not returned.
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = Self::load(path)?;
        overrides.apply(&mut config);
        config.validate()?;

        for warning in config.check() {
            warn!("{}", warning);
        }

        Ok(config)
    }
}
