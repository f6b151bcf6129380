use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub push: PushConfig,
}

/// TCP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Cap on simultaneous device sessions; connections beyond it are rejected.
    pub max_connections: usize,
}

/// Analysis service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Push gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PushConfig {
    pub endpoint: String,
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            max_connections: defaults::MAX_CONNECTIONS,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ANALYSIS_ENDPOINT.to_string(),
            timeout_secs: defaults::ANALYSIS_TIMEOUT_SECS,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::PUSH_ENDPOINT.to_string(),
            title: defaults::PUSH_TITLE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    // Re-panic on invalid TOML or other errors
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CALLGUARD_PORT → server.port
    /// - CALLGUARD_HOST → server.host
    /// - CALLGUARD_ANALYSIS_ENDPOINT → analysis.endpoint
    /// - CALLGUARD_PUSH_ENDPOINT → push.endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("CALLGUARD_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            self.server.port = port;
        }

        if let Ok(host) = std::env::var("CALLGUARD_HOST")
            && !host.is_empty()
        {
            self.server.host = host;
        }

        if let Ok(endpoint) = std::env::var("CALLGUARD_ANALYSIS_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.analysis.endpoint = endpoint;
        }

        if let Ok(endpoint) = std::env::var("CALLGUARD_PUSH_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.push.endpoint = endpoint;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/callguard/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("callguard")
            .join("config.toml")
    }
}
