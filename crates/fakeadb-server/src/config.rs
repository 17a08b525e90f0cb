//! Server configuration: TOML file + CLI overrides.

use fakeadb_core::{BridgeError, BridgeResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    /// Devices to pre-register when running standalone.
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceSection>,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// One `[[device]]` block.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    pub serial: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default = "default_state")]
    pub state: String,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    // The real daemon's well-known host port.
    5037
}
fn default_state() -> String {
    "online".to_string()
}

/// Resolved server configuration (file values with CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub devices: Vec<DeviceSection>,
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
    ) -> BridgeResult<Self> {
        let file_config = match config_path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading config file");
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| BridgeError::Other(format!("config parse error: {e}")))?
            }
            Some(path) => {
                info!(path = %path.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
            None => ConfigFile::default(),
        };

        Ok(Self {
            bind: cli_bind
                .map(str::to_string)
                .unwrap_or(file_config.server.bind),
            port: cli_port.unwrap_or(file_config.server.port),
            devices: file_config.devices,
        })
    }

    /// `bind:port` in the form the listener expects.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_blocks() {
        let parsed: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 6000

            [[device]]
            serial = "emulator-5554"
            state = "online"

            [device.properties]
            "ro.product.model" = "FakePhone"

            [[device]]
            serial = "emulator-5556"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.server.port, 6000);
        assert_eq!(parsed.devices.len(), 2);
        assert_eq!(
            parsed.devices[0].properties.get("ro.product.model").map(String::as_str),
            Some("FakePhone")
        );
        assert_eq!(parsed.devices[1].state, "online");
    }

    #[test]
    fn defaults_without_file() {
        let config = ServerConfig::load(None, None, None).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:5037");
        assert!(config.devices.is_empty());
    }
}
