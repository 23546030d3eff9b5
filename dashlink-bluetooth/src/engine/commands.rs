use crate::bus::{BusSession, MethodCall};
use crate::error::BusError;

use super::Engine;

/// Work submitted by consumers, executed only on the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleDiscovery,
    PairAndConnect(String),
    Disconnect(String),
}

impl<B: BusSession> Engine<B> {
    pub(super) async fn dispatch(&mut self, command: Command) {
        match command {
            Command::ToggleDiscovery => self.toggle_discovery().await,
            Command::PairAndConnect(path) => {
                if let Err(e) = self.pair_and_connect(&path).await {
                    self.state
                        .write()
                        .await
                        .record_error(format!("Failed to pair/connect: {e}"));
                }
            }
            Command::Disconnect(path) => {
                tracing::info!("Disconnecting from {}", path);
                if let Err(e) = self.bus.call(&path, MethodCall::Disconnect).await {
                    self.state
                        .write()
                        .await
                        .record_error(format!("Failed to disconnect: {e}"));
                }
            }
        }
    }

    async fn toggle_discovery(&mut self) {
        let Some(adapter) = self.adapter.clone() else {
            self.state
                .write()
                .await
                .record_error("Discovery toggle error: no Bluetooth adapter".to_string());
            return;
        };

        let scanning = self.state.read().await.scanning;
        let method = if scanning {
            tracing::info!("Stopping discovery...");
            MethodCall::StopDiscovery
        } else {
            tracing::info!("Starting discovery...");
            MethodCall::StartDiscovery
        };

        let result = self.bus.call(&adapter, method).await;
        let mut state = self.state.write().await;
        match result {
            Ok(()) => state.set_scanning(!scanning),
            Err(e) => {
                state.set_scanning(false);
                state.record_error(format!("Discovery toggle error: {e}"));
            }
        }
    }

    // Status is left alone; a successful connect arrives as PropertiesChanged.
    async fn pair_and_connect(&mut self, path: &str) -> Result<(), BusError> {
        if !self.bus.device_paired(path).await? {
            tracing::info!("Pairing with device at {}", path);
            self.bus.call(path, MethodCall::Pair).await?;
            tokio::time::sleep(self.config.pair_settle_delay).await;
        }

        tracing::info!("Connecting to device at {}", path);
        self.bus.call(path, MethodCall::Connect).await
    }
}
