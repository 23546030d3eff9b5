/*!
 * State Projection
 * The engine's in-memory view of BlueZ, mutated only under the engine lock
 */

use chrono::Utc;
use std::collections::BTreeMap;

use crate::bus::{AdapterProperties, DeviceProperties, PlayerProperties};
use crate::model::{
    AdapterInfo, ConnectedDevice, DeviceInfo, Snapshot, Status, TrackMetadata, NO_TRACK,
    UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_DEVICE,
};

#[derive(Debug)]
pub struct Projection {
    pub(crate) status: Status,
    pub(crate) metadata: Option<TrackMetadata>,
    pub(crate) connected: ConnectedDevice,
    pub(crate) devices: BTreeMap<String, DeviceInfo>,
    pub(crate) scanning: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) adapter: Option<AdapterInfo>,
    pub(crate) player: Option<String>,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            status: Status::Initializing,
            metadata: None,
            connected: ConnectedDevice::none(),
            devices: BTreeMap::new(),
            scanning: false,
            last_error: None,
            adapter: None,
            player: None,
        }
    }
}

impl Projection {
    pub fn set_status(&mut self, status: Status) {
        if self.status != status {
            tracing::info!("Status -> {}", status);
            self.status = status;
        }
    }

    pub fn record_error(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.last_error = Some(message);
    }

    pub fn set_scanning(&mut self, scanning: bool) {
        self.scanning = scanning;
    }

    pub fn set_adapter(&mut self, path: &str, props: &AdapterProperties) {
        self.adapter = Some(AdapterInfo {
            path: path.to_string(),
            powered: props.powered.unwrap_or(false),
            discoverable: props.discoverable.unwrap_or(false),
        });
    }

    pub fn apply_adapter_change(&mut self, path: &str, props: &AdapterProperties) {
        let Some(adapter) = self.adapter.as_mut().filter(|a| a.path == path) else {
            return;
        };
        if let Some(powered) = props.powered {
            adapter.powered = powered;
        }
        if let Some(discoverable) = props.discoverable {
            adapter.discoverable = discoverable;
        }
    }

    /// Create or overwrite a device from a full property set (enumeration or
    /// `InterfacesAdded`).
    pub fn insert_device(&mut self, path: &str, props: &DeviceProperties) {
        let device = DeviceInfo {
            name: props
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            paired: props.paired.unwrap_or(false),
            connected: props.connected.unwrap_or(false),
        };
        tracing::debug!("Discovered: {} at {}", device.name, path);
        self.devices.insert(path.to_string(), device);
        self.sync_connection(path);
    }

    /// Apply a `PropertiesChanged` payload; keys that are absent keep their value.
    pub fn apply_device_change(&mut self, path: &str, props: &DeviceProperties) {
        let device = self.devices.entry(path.to_string()).or_default();
        if let Some(name) = &props.name {
            device.name = name.clone();
        }
        if let Some(paired) = props.paired {
            device.paired = paired;
        }
        if let Some(connected) = props.connected {
            device.connected = connected;
        }

        if props.connected.is_some() {
            self.sync_connection(path);
        } else if props.name.is_some() && self.connected.path.as_deref() == Some(path) {
            self.connected.name = self.devices[path].name.clone();
        }
    }

    // ConnectedDevice is derived from the table entry just written.
    fn sync_connection(&mut self, path: &str) {
        let Some(device) = self.devices.get(path) else {
            return;
        };
        let is_current = self.connected.path.as_deref() == Some(path);

        if device.connected {
            self.connected.name = device.name.clone();
            if !is_current {
                tracing::info!("Device connected: {}", device.name);
                self.connected.path = Some(path.to_string());
                self.set_status(Status::Connected);
            }
        } else if is_current {
            tracing::info!("Device disconnected: {}", self.connected.name);
            self.connected = ConnectedDevice::none();
            self.metadata = None;
            self.player = None;
            self.set_status(Status::Ready);
        }
    }

    pub fn bind_player(&mut self, path: &str) {
        self.player = Some(path.to_string());
    }

    pub fn unbind_player(&mut self) {
        self.player = None;
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    /// Replace status and metadata wholesale from a player fetch.
    pub fn apply_player(&mut self, props: PlayerProperties) {
        let track = props.track;
        self.metadata = Some(TrackMetadata {
            title: track.title.unwrap_or_else(|| NO_TRACK.to_string()),
            artist: track.artist.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
            album: track.album.unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        });
        self.set_status(Status::from_playback(props.status));
    }

    /// The bound player stopped answering.
    pub fn player_lost(&mut self) {
        self.player = None;
        if self.connected.is_none() {
            self.metadata = None;
            self.set_status(Status::Ready);
        } else {
            self.set_status(Status::NoMediaInfo);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status.clone(),
            metadata: self.metadata.clone(),
            connected_device: self.connected.clone(),
            devices: self.devices.clone(),
            scanning: self.scanning,
            last_error: self.last_error.clone(),
            adapter: self.adapter.clone(),
            media_player: self.player.clone(),
            taken_at: Utc::now(),
        }
    }
}

/// Whether a snapshot upholds the connected-device invariants.
pub fn is_consistent(snapshot: &Snapshot) -> bool {
    match &snapshot.connected_device.path {
        Some(path) => snapshot.devices.get(path).is_some_and(|d| d.connected),
        None => snapshot.connected_device.name == "None",
    }
}
