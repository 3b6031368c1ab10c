//! Configuration document parsing and validation
//!
//! Read once at supervisor startup. Schema is JSON (see spec.md §6); unlike
//! the teacher's per-user TOML config directory, this is a single document
//! whose path is given on the command line (default `config.json` in the
//! working directory), matching `original_source/serial_forwarder.py`'s
//! `MultiPortForwarder`.

use crate::error::{ForwarderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_buffer_size() -> usize {
    crate::constants::DEFAULT_BUFFER_SIZE
}

fn default_reconnect_interval() -> u64 {
    crate::constants::DEFAULT_RECONNECT_INTERVAL_SECS
}

fn default_send_delay() -> u64 {
    crate::constants::DEFAULT_SEND_DELAY_SECS
}

fn default_parity() -> char {
    'N'
}

fn default_stopbits() -> f32 {
    1.0
}

fn default_timeout_ms() -> u64 {
    1000
}

/// One port's configuration, immutable for the lifetime of its engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    pub name: String,

    pub serial_port: String,
    pub serial_baudrate: u32,
    pub serial_bytesize: u8,
    #[serde(default = "default_parity")]
    pub serial_parity: char,
    #[serde(default = "default_stopbits")]
    pub serial_stopbits: f32,
    #[serde(default = "default_timeout_ms")]
    pub serial_timeout: u64,
    #[serde(default)]
    pub serial_xonxoff: bool,
    #[serde(default)]
    pub serial_rtscts: bool,

    #[serde(default)]
    pub tcp_host: String,
    #[serde(default)]
    pub tcp_port: u16,

    /// Presence selects the HTTP-relay transport variant instead of Direct-TCP
    #[serde(default)]
    pub http_url: Option<String>,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval: u64,
    #[serde(default = "default_send_delay")]
    pub send_delay: u64,
}

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ports: Vec<PortConfig>,
}

impl Config {
    /// Load and validate the configuration document at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ForwarderError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|e| ForwarderError::Config {
            reason: format!("invalid JSON in {}: {}", path.display(), e),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ports.is_empty() {
            return Err(ForwarderError::Config {
                reason: "configuration has no ports".into(),
            });
        }

        let mut seen_names = std::collections::HashSet::new();
        for port in &self.ports {
            if port.name.is_empty() {
                return Err(ForwarderError::Config {
                    reason: "port name must not be empty".into(),
                });
            }
            if !seen_names.insert(port.name.clone()) {
                return Err(ForwarderError::Config {
                    reason: format!("duplicate port name: {}", port.name),
                });
            }
            if !matches!(port.serial_bytesize, 5..=8) {
                return Err(ForwarderError::Config {
                    reason: format!(
                        "[{}] serial_bytesize must be one of 5,6,7,8, got {}",
                        port.name, port.serial_bytesize
                    ),
                });
            }
            if !matches!(port.serial_parity, 'N' | 'E' | 'O') {
                return Err(ForwarderError::Config {
                    reason: format!(
                        "[{}] serial_parity must be one of N,E,O, got {}",
                        port.name, port.serial_parity
                    ),
                });
            }
            if !matches!(port.serial_stopbits, 1.0 | 1.5 | 2.0) {
                return Err(ForwarderError::Config {
                    reason: format!(
                        "[{}] serial_stopbits must be one of 1, 1.5, 2, got {}",
                        port.name, port.serial_stopbits
                    ),
                });
            }
            let has_tcp_target = !port.tcp_host.is_empty() && port.tcp_port != 0;
            if port.http_url.is_none() && !has_tcp_target {
                return Err(ForwarderError::Config {
                    reason: format!(
                        "[{}] Direct-TCP variant requires tcp_host and tcp_port",
                        port.name
                    ),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_valid_config() {
        let file = write_config(
            r#"{
                "ports": [
                    {
                        "name": "port1",
                        "serial_port": "/dev/ttyUSB0",
                        "serial_baudrate": 9600,
                        "serial_bytesize": 8,
                        "tcp_host": "localhost",
                        "tcp_port": 5000
                    }
                ]
            }"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.ports.len(), 1);
        let port = &config.ports[0];
        assert_eq!(port.buffer_size, crate::constants::DEFAULT_BUFFER_SIZE);
        assert_eq!(
            port.reconnect_interval,
            crate::constants::DEFAULT_RECONNECT_INTERVAL_SECS
        );
        assert_eq!(port.send_delay, crate::constants::DEFAULT_SEND_DELAY_SECS);
        assert_eq!(port.serial_parity, 'N');
        assert_eq!(port.serial_stopbits, 1.0);
    }

    #[test]
    fn http_relay_variant_skips_tcp_host_requirement() {
        let file = write_config(
            r#"{
                "ports": [
                    {
                        "name": "port1",
                        "serial_port": "/dev/ttyUSB0",
                        "serial_baudrate": 9600,
                        "serial_bytesize": 8,
                        "http_url": "http://collector.example/forward"
                    }
                ]
            }"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert!(config.ports[0].http_url.is_some());
    }

    #[test]
    fn rejects_empty_ports() {
        let file = write_config(r#"{"ports": []}"#);
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn rejects_duplicate_port_names() {
        let file = write_config(
            r#"{
                "ports": [
                    {"name": "a", "serial_port": "/dev/ttyUSB0", "serial_baudrate": 9600, "serial_bytesize": 8, "tcp_host": "h", "tcp_port": 1},
                    {"name": "a", "serial_port": "/dev/ttyUSB1", "serial_baudrate": 9600, "serial_bytesize": 8, "tcp_host": "h", "tcp_port": 2}
                ]
            }"#,
        );
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn rejects_bad_bytesize() {
        let file = write_config(
            r#"{
                "ports": [
                    {"name": "a", "serial_port": "/dev/ttyUSB0", "serial_baudrate": 9600, "serial_bytesize": 9, "tcp_host": "h", "tcp_port": 1}
                ]
            }"#,
        );
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn rejects_missing_tcp_target_without_http_url() {
        let file = write_config(
            r#"{
                "ports": [
                    {"name": "a", "serial_port": "/dev/ttyUSB0", "serial_baudrate": 9600, "serial_bytesize": 8}
                ]
            }"#,
        );
        assert!(Config::load(file.path()).is_err());
    }
}
