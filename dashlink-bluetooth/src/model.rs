/*!
 * Projection Value Types
 * What the engine knows about the adapter, devices and the media player
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const UNKNOWN_DEVICE: &str = "Unknown Device";
pub const NO_TRACK: &str = "No Track";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Coarse engine state shown to consumers.
///
/// The string forms are part of the consumer contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Status {
    Initializing,
    NoAdapter,
    Ready,
    Connected,
    NoMediaInfo,
    Failed,
    /// Raw `Status` property reported by the bound media player.
    Playback(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTone {
    Error,
    Active,
    Idle,
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Initializing => "Initializing...",
            Status::NoAdapter => "Error: No Bluetooth Adapter Found",
            Status::Ready => "Ready - No Device Connected",
            Status::Connected => "Connected",
            Status::NoMediaInfo => "Connected - No Media Info",
            Status::Failed => "Error: Bluetooth Failed",
            Status::Playback(raw) => raw,
        }
    }

    /// Player status with the engine's fallback when the player reports none.
    pub fn from_playback(raw: Option<String>) -> Self {
        match raw {
            Some(raw) if !raw.is_empty() => Status::Playback(raw),
            _ => Status::Connected,
        }
    }

    /// Classified from the displayed text: "Error" wins over "Connected".
    pub fn tone(&self) -> StatusTone {
        let text = self.as_str();
        if text.contains("Error") {
            StatusTone::Error
        } else if text.contains("Connected") {
            StatusTone::Active
        } else {
            StatusTone::Idle
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Playback(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl From<String> for Status {
    fn from(raw: String) -> Self {
        [
            Status::Initializing,
            Status::NoAdapter,
            Status::Ready,
            Status::Connected,
            Status::NoMediaInfo,
            Status::Failed,
        ]
        .into_iter()
        .find(|known| known.as_str() == raw)
        .unwrap_or(Status::Playback(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub path: String,
    pub powered: bool,
    pub discoverable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub paired: bool,
    pub connected: bool,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            name: UNKNOWN_DEVICE.to_string(),
            paired: false,
            connected: false,
        }
    }
}

/// What a consumer should offer for a device in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAction {
    Pair,
    Connect,
    Disconnect,
}

impl DeviceInfo {
    pub fn action(&self) -> DeviceAction {
        if self.connected {
            DeviceAction::Disconnect
        } else if self.paired {
            DeviceAction::Connect
        } else {
            DeviceAction::Pair
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceAction::Pair => "Pair",
            DeviceAction::Connect => "Connect",
            DeviceAction::Disconnect => "Disconnect",
        })
    }
}

/// The device the engine currently treats as connected, or the "None" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub name: String,
    pub path: Option<String>,
}

impl ConnectedDevice {
    pub fn none() -> Self {
        Self {
            name: "None".to_string(),
            path: None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.path.is_none()
    }
}

impl Default for ConnectedDevice {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            title: NO_TRACK.to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
        }
    }
}

impl TrackMetadata {
    /// False for placeholder titles that some phones send instead of an empty track.
    pub fn has_track(&self) -> bool {
        !matches!(self.title.as_str(), "" | "---" | NO_TRACK)
    }
}

/// Every projection field copied under a single read guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: Status,
    pub metadata: Option<TrackMetadata>,
    pub connected_device: ConnectedDevice,
    pub devices: BTreeMap<String, DeviceInfo>,
    pub scanning: bool,
    pub last_error: Option<String>,
    pub adapter: Option<AdapterInfo>,
    pub media_player: Option<String>,
    pub taken_at: DateTime<Utc>,
}
