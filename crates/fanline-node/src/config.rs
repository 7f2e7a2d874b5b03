//! Node configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (FANLINE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Substrate configuration.
    #[serde(default)]
    pub substrate: SubstrateConfig,

    /// Fanout configuration.
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Which substrate backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstrateBackend {
    /// In-process backend (single node).
    Memory,
    /// Redis backend (fleet).
    Redis,
}

/// Substrate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// Backend selection.
    #[serde(default = "default_backend")]
    pub backend: SubstrateBackend,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

/// Fanout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Audience members per store batch.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_backend() -> SubstrateBackend {
    match std::env::var("FANLINE_SUBSTRATE").as_deref() {
        Ok("redis") => SubstrateBackend::Redis,
        _ => SubstrateBackend::Memory,
    }
}

fn default_redis_url() -> String {
    std::env::var("FANLINE_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn default_chunk_size() -> usize {
    std::env::var("FANLINE_CHUNK_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(500)
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            substrate: SubstrateConfig::default(),
            fanout: FanoutConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: default_redis_url(),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "fanline.toml",
            "/etc/fanline/fanline.toml",
            "~/.config/fanline/fanline.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fanout.chunk_size, 500);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [substrate]
            backend = "redis"
            redis_url = "redis://cache.internal:6379"

            [fanout]
            chunk_size = 250

            [metrics]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.substrate.backend, SubstrateBackend::Redis);
        assert_eq!(config.substrate.redis_url, "redis://cache.internal:6379");
        assert_eq!(config.fanout.chunk_size, 250);
        assert!(!config.metrics.enabled);
    }
}
