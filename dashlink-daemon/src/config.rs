use anyhow::Result;
use dashlink_bluetooth::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub bluetooth: BluetoothConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothConfig {
    pub discoverable_timeout: u32,
    pub player_poll_secs: u64,
    pub pair_settle_ms: u64,
    pub call_timeout_secs: u64,
    pub command_queue: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/run/dashlink/dashlink.sock".to_string(),
            bluetooth: BluetoothConfig::default(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            discoverable_timeout: 0,
            player_poll_secs: 2,
            pair_settle_ms: 2000,
            call_timeout_secs: 25,
            command_queue: 32,
        }
    }
}

impl BluetoothConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            player_poll_interval: Duration::from_secs(self.player_poll_secs.max(1)),
            pair_settle_delay: Duration::from_millis(self.pair_settle_ms),
            discoverable_timeout: self.discoverable_timeout,
            command_queue: self.command_queue,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(_) => {
                // Create default config if not found
                let config = Self::default();
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::debug!("Could not write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashlinkd.toml");

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.socket_path, "/run/dashlink/dashlink.sock");
        assert_eq!(config.bluetooth.discoverable_timeout, 0);

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("[bluetooth]"));
        assert!(written.contains("pair_settle_ms = 2000"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashlinkd.toml");
        fs::write(
            &path,
            "socket_path = \"/tmp/dl.sock\"\n[bluetooth]\npair_settle_ms = 500\n",
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.socket_path, "/tmp/dl.sock");

        let engine = config.bluetooth.engine_config();
        assert_eq!(engine.pair_settle_delay, Duration::from_millis(500));
        assert_eq!(engine.player_poll_interval, Duration::from_secs(2));
        assert_eq!(engine.command_queue, 32);
        assert_eq!(config.bluetooth.call_timeout(), Duration::from_secs(25));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashlinkd.toml");
        fs::write(&path, "socket_path = [").unwrap();
        assert!(DaemonConfig::load(&path).is_err());
    }
}
