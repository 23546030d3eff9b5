/*!
 * Engine Handle
 * Read API and command submission for consumers on any thread
 */

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};

use crate::engine::Command;
use crate::error::EngineError;
use crate::model::{
    AdapterInfo, ConnectedDevice, DeviceAction, DeviceInfo, Snapshot, Status, TrackMetadata,
};
use crate::projection::Projection;

/// Cheap to clone; every clone talks to the same engine.
#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<RwLock<Projection>>,
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl EngineHandle {
    pub(crate) fn new(
        state: Arc<RwLock<Projection>>,
        commands: mpsc::Sender<Command>,
        shutdown: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            state,
            commands,
            shutdown,
        }
    }

    pub async fn status(&self) -> Status {
        self.state.read().await.status.clone()
    }

    pub async fn metadata(&self) -> Option<TrackMetadata> {
        self.state.read().await.metadata.clone()
    }

    pub async fn connected_device(&self) -> ConnectedDevice {
        self.state.read().await.connected.clone()
    }

    pub async fn discovered_devices(&self) -> BTreeMap<String, DeviceInfo> {
        self.state.read().await.devices.clone()
    }

    pub async fn is_scanning(&self) -> bool {
        self.state.read().await.scanning
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn adapter(&self) -> Option<AdapterInfo> {
        self.state.read().await.adapter.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.snapshot()
    }

    /// Snapshot for consumers that poll from a plain thread.
    ///
    /// Panics if called from inside an async context.
    pub fn blocking_snapshot(&self) -> Snapshot {
        self.state.blocking_read().snapshot()
    }

    pub fn toggle_discovery(&self) -> Result<(), EngineError> {
        self.submit(Command::ToggleDiscovery)
    }

    pub fn pair_and_connect(&self, path: impl Into<String>) -> Result<(), EngineError> {
        self.submit(Command::PairAndConnect(path.into()))
    }

    pub fn disconnect(&self, path: impl Into<String>) -> Result<(), EngineError> {
        self.submit(Command::Disconnect(path.into()))
    }

    /// Run the command behind a device's suggested action.
    pub fn perform(
        &self,
        path: impl Into<String>,
        action: DeviceAction,
    ) -> Result<(), EngineError> {
        match action {
            DeviceAction::Disconnect => self.disconnect(path),
            DeviceAction::Pair | DeviceAction::Connect => self.pair_and_connect(path),
        }
    }

    fn submit(&self, command: Command) -> Result<(), EngineError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => EngineError::QueueFull,
            TrySendError::Closed(_) => EngineError::Stopped,
        })
    }

    /// Ask the run loop to stop and release the bus session.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once `shutdown` has been called on any clone.
    pub async fn stopped(&self) {
        let mut stopped = self.shutdown.subscribe();
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }
}
