/*!
 * Bus Session Boundary
 * Typed view of the BlueZ objects and signals the engine consumes
 */

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BusError;

/// Partial device property set. `None` means the key was not present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    pub name: Option<String>,
    pub paired: Option<bool>,
    pub connected: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterProperties {
    pub powered: Option<bool>,
    pub discoverable: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFields {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Result of a wholesale `GetAll` on the media player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerProperties {
    pub status: Option<String>,
    pub track: TrackFields,
}

/// One BlueZ interface an object implements, with the properties we track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Adapter(AdapterProperties),
    Device(DeviceProperties),
    MediaPlayer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedObject {
    pub path: String,
    pub capabilities: Vec<Capability>,
}

impl ManagedObject {
    pub fn adapter(&self) -> Option<&AdapterProperties> {
        self.capabilities.iter().find_map(|cap| match cap {
            Capability::Adapter(props) => Some(props),
            _ => None,
        })
    }

    pub fn device(&self) -> Option<&DeviceProperties> {
        self.capabilities.iter().find_map(|cap| match cap {
            Capability::Device(props) => Some(props),
            _ => None,
        })
    }

    pub fn is_media_player(&self) -> bool {
        self.capabilities
            .iter()
            .any(|cap| matches!(cap, Capability::MediaPlayer))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChange {
    Adapter(AdapterProperties),
    Device(DeviceProperties),
    /// Player properties changed; the engine refetches everything.
    MediaPlayer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusSignal {
    PropertiesChanged {
        path: String,
        change: PropertyChange,
    },
    InterfacesAdded {
        path: String,
        capabilities: Vec<Capability>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterSetting {
    Powered(bool),
    Discoverable(bool),
    DiscoverableTimeout(u32),
}

impl AdapterSetting {
    pub fn property(&self) -> &'static str {
        match self {
            AdapterSetting::Powered(_) => "Powered",
            AdapterSetting::Discoverable(_) => "Discoverable",
            AdapterSetting::DiscoverableTimeout(_) => "DiscoverableTimeout",
        }
    }
}

/// Argument-less methods the engine invokes on adapters and devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodCall {
    StartDiscovery,
    StopDiscovery,
    Pair,
    Connect,
    Disconnect,
}

impl MethodCall {
    pub fn member(&self) -> &'static str {
        match self {
            MethodCall::StartDiscovery => "StartDiscovery",
            MethodCall::StopDiscovery => "StopDiscovery",
            MethodCall::Pair => "Pair",
            MethodCall::Connect => "Connect",
            MethodCall::Disconnect => "Disconnect",
        }
    }

    pub fn targets_adapter(&self) -> bool {
        matches!(self, MethodCall::StartDiscovery | MethodCall::StopDiscovery)
    }
}

/// Everything the engine needs from the system bus.
///
/// Implementations are only ever driven from the engine's run loop, one call
/// at a time.
#[async_trait]
pub trait BusSession: Send + Sync + 'static {
    /// Start forwarding `PropertiesChanged` and `InterfacesAdded` into `sink`.
    async fn subscribe(&self, sink: mpsc::UnboundedSender<BusSignal>) -> Result<(), BusError>;

    async fn managed_objects(&self) -> Result<Vec<ManagedObject>, BusError>;

    async fn set_adapter(&self, adapter: &str, setting: AdapterSetting) -> Result<(), BusError>;

    async fn call(&self, path: &str, method: MethodCall) -> Result<(), BusError>;

    async fn device_paired(&self, device: &str) -> Result<bool, BusError>;

    /// Establish a handle to the media player at `player`.
    async fn bind_player(&self, player: &str) -> Result<(), BusError>;

    async fn player_properties(&self, player: &str) -> Result<PlayerProperties, BusError>;

    /// Drop subscriptions. Called once when the run loop stops.
    async fn close(&self);
}
