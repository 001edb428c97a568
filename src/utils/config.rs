// src/utils/config.rs
//! Engine configuration
//!
//! Values are layered in this order, later sources winning:
//!
//! 1. built-in defaults
//! 2. an optional `api-sniffer.toml` in the working directory
//! 3. environment variables prefixed with `SNIFFER`, using `__` as the
//!    section separator (e.g. `SNIFFER_STORAGE__PATH=/tmp/sniffer.db`)

use crate::utils::errors::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Default configuration file name (without extension)
pub const CONFIG_FILE_NAME: &str = "api-sniffer";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SNIFFER";

/// Top-level engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub storage: StorageSection,
    pub relay: RelaySection,
    pub export: ExportSection,
    pub observability: ObservabilitySection,
}

/// Persistent storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// SQLite database holding the `recording`, `paused`, `logs` and `settings` blobs
    pub path: PathBuf,
}

/// Relay settings
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// Capacity of each page message bus; slow readers lose the oldest messages
    pub page_bus_capacity: usize,
}

/// Export settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExportSection {
    /// Directory the binary writes export files into
    pub output_dir: PathBuf,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilitySection {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub log_level: String,

    /// Emit JSON formatted log lines
    pub json_logs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageSection {
                path: PathBuf::from("api-sniffer.db"),
            },
            relay: RelaySection {
                page_bus_capacity: 1024,
            },
            export: ExportSection {
                output_dir: PathBuf::from("exports"),
            },
            observability: ObservabilitySection {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, the optional config file and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE_NAME)
    }

    /// Load configuration using a specific file stem (extension is detected by `config`)
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let defaults = Self::default();

        let config = Config::builder()
            .set_default(
                "storage.path",
                defaults.storage.path.to_string_lossy().as_ref(),
            )?
            .set_default(
                "relay.page_bus_capacity",
                defaults.relay.page_bus_capacity as u64,
            )?
            .set_default(
                "export.output_dir",
                defaults.export.output_dir.to_string_lossy().as_ref(),
            )?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.json_logs", defaults.observability.json_logs)?
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.relay.page_bus_capacity, 1024);
        assert_eq!(config.observability.log_level, "info");
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("sniffer");
        std::fs::write(
            stem.with_extension("toml"),
            "[relay]\npage_bus_capacity = 16\n\n[export]\noutput_dir = \"/tmp/out\"\n",
        )
        .unwrap();

        let config = EngineConfig::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(config.relay.page_bus_capacity, 16);
        assert_eq!(config.export.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.storage.path, PathBuf::from("api-sniffer.db"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load_from("definitely-not-a-config-file").unwrap();
        assert_eq!(config.observability.log_level, "info");
    }
}
