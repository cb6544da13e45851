//! Monitor configuration

use can_driver::DEFAULT_FIFO_DEPTH;
use can_queue::BusConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `CAN_MONITOR__BUS__BITRATE=250000`
pub const ENV_PREFIX: &str = "CAN_MONITOR";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// CAN bus settings
    pub bus: BusConfig,
    /// Main loop period in milliseconds (default: 1000)
    pub tick_ms: u64,
    /// Stop after this many ticks; run until Ctrl-C when unset
    pub ticks: Option<u64>,
    /// Queue a heartbeat frame from this node every tick
    pub heartbeat: bool,
    /// Depth of the simulated controller's receive FIFO
    pub fifo_depth: usize,
    pub log_format: LogFormat,
    /// `tracing` level filter (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::loopback(),
            tick_ms: 1000,
            ticks: None,
            heartbeat: true,
            fifo_depth: DEFAULT_FIFO_DEPTH,
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
