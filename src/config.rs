//! Bench configuration: instrument addresses, I/O timeout and listen address,
//! loaded from JSON with defaults for every missing field.

use crate::session::{Connector, TcpConnector, DEFAULT_IO_TIMEOUT_MS};
use crate::simulator::SimulatedBench;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POWER_SUPPLY: &str = "192.168.1.50:5555";
pub const DEFAULT_MULTIMETER: &str = "192.168.1.51:5025";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// `host:port` of the power supply's SCPI socket.
    pub power_supply: String,
    /// `host:port` of the multimeter's SCPI socket.
    pub multimeter: String,
    pub io_timeout_ms: u64,
    /// Address the batch server listens on.
    pub listen: String,
    /// Serve a simulated bench instead of real instruments.
    pub simulate: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            power_supply: DEFAULT_POWER_SUPPLY.to_string(),
            multimeter: DEFAULT_MULTIMETER.to_string(),
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            listen: DEFAULT_LISTEN.to_string(),
            simulate: false,
        }
    }
}

impl BenchConfig {
    pub fn from_json(json: &str, path: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let display = path.as_ref().display().to_string();
        let json = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&json, &display)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.io_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Connector for the configured bench: simulated or SCPI over TCP.
    pub fn connector(&self) -> Box<dyn Connector + Send + Sync> {
        if self.simulate {
            Box::new(SimulatedBench::new())
        } else {
            Box::new(TcpConnector::new(
                self.power_supply.clone(),
                self.multimeter.clone(),
                self.io_timeout(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InstrumentKind;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = BenchConfig::from_json(r#"{"simulate": true, "io_timeout_ms": 500}"#, "test.json").unwrap();
        assert!(config.simulate);
        assert_eq!(config.io_timeout(), Duration::from_millis(500));
        assert_eq!(config.power_supply, DEFAULT_POWER_SUPPLY);
        assert_eq!(config.listen, DEFAULT_LISTEN);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = BenchConfig::from_json(r#"{"io_timeout_ms": 0}"#, "test.json");
        assert!(matches!(result, Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_malformed_config_names_file() {
        let error = BenchConfig::from_json("{not json", "bench.json").unwrap_err();
        assert!(error.to_string().starts_with("invalid config bench.json"));
    }

    #[test]
    fn test_missing_file() {
        let error = BenchConfig::load("/nonexistent/pcbdbg.json").unwrap_err();
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn test_simulated_connector_opens_both_instruments() {
        let config = BenchConfig {
            simulate: true,
            ..BenchConfig::default()
        };
        let connector = config.connector();
        assert!(connector.open(InstrumentKind::PowerSupply).is_ok());
        assert!(connector.open(InstrumentKind::Multimeter).is_ok());
    }
}
