//! Process configuration (spec §6).
//!
//! Consumed once at startup: a TOML document deserialized into [`Config`],
//! validated against the host's virtual topology, and split into the
//! [`crate::model::LatencyModel`] the rest of the core reads.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors from loading or validating [`Config`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config file {path}: {reason}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// `io::Error` rendered to a string (so the type stays `Clone`/`Eq`).
        reason: String,
    },

    /// The file was read but is not valid TOML, or doesn't match [`Config`]'s shape.
    #[error("could not parse config: {0}")]
    Parse(String),
}

/// `[latency]` section: the emulation target and its knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct LatencyConfig {
    /// Target read latency in nanoseconds.
    pub read: u64,
    /// Target write latency in nanoseconds. Tracked but never injected by
    /// this core (spec §9, "Write latency").
    pub write: u64,
    /// Whether computed delays are actually spun on, or only computed.
    #[serde(default)]
    pub inject_delay: bool,
    /// Whether to apply `calibration_factor` to raw stall cycles.
    #[serde(default)]
    pub calibration: bool,
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `trace` / `debug` / `info` / `warn` / `error`. Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// One `[[topology.nodes]]` entry: the DRAM and emulated-NVRAM latency of a
/// virtual node, used only to validate `latency.read`/`latency.write` at
/// startup (spec §3 invariant).
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyNodeConfig {
    /// Hardware latency in ns of the DRAM-backed region.
    pub dram_latency_ns: u64,
    /// Hardware latency in ns of the NVRAM-backed region.
    pub nvram_latency_ns: u64,
}

/// `[topology]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TopologyConfig {
    /// Virtual nodes to validate against `latency`.
    #[serde(default)]
    pub nodes: Vec<TopologyNodeConfig>,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// See [`LatencyConfig`].
    pub latency: LatencyConfig,
    /// See [`LoggingConfig`].
    #[serde(default)]
    pub logging: LoggingConfig,
    /// See [`TopologyConfig`].
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl Config {
    /// Loads and parses a TOML config file. Does not validate against
    /// hardware latencies — that happens in
    /// [`crate::model::LatencyModel::init`], which needs the topology too.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [latency]
            read = 300
            write = 280
            inject_delay = true
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.latency.read, 300);
        assert_eq!(cfg.latency.write, 280);
        assert!(cfg.latency.inject_delay);
        assert!(!cfg.latency.calibration);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.topology.nodes.is_empty());
    }

    #[test]
    fn parses_topology_nodes() {
        let toml = r#"
            [latency]
            read = 300
            write = 280

            [[topology.nodes]]
            dram_latency_ns = 80
            nvram_latency_ns = 200
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.topology.nodes.len(), 1);
        assert_eq!(cfg.topology.nodes[0].dram_latency_ns, 80);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Config::load("/nonexistent/path/to/memlat.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
