/*!
 * BlueZ Bus Session
 * D-Bus system bus access via dbus-tokio
 */

use async_trait::async_trait;
use dbus::arg::{prop_cast, PropMap, RefArg};
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::{ObjectManager, Properties};
use dbus::nonblock::{MsgMatch, Proxy, SyncConnection};
use dbus::{Message, Path};
use dbus_tokio::connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::{
    AdapterProperties, AdapterSetting, BusSession, BusSignal, Capability, DeviceProperties,
    ManagedObject, MethodCall, PlayerProperties, PropertyChange, TrackFields,
};
use crate::error::BusError;

pub const BLUEZ_SERVICE: &str = "org.bluez";
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const MEDIA_PLAYER_INTERFACE: &str = "org.bluez.MediaPlayer1";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";
const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
const DBUS_SERVICE: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";

pub struct BluezSession {
    conn: Arc<SyncConnection>,
    timeout: Duration,
    // The connection only holds weak references; dropping these unsubscribes.
    matches: Mutex<Vec<MsgMatch>>,
    io_task: JoinHandle<()>,
}

impl BluezSession {
    /// Connect to the system bus. Must be called from inside a tokio runtime.
    pub async fn connect(timeout: Duration) -> Result<Self, BusError> {
        let (resource, conn) = connection::new_system_sync()?;
        let io_task = tokio::spawn(async move {
            let err = resource.await;
            tracing::error!("Lost connection to D-Bus: {}", err);
        });

        tracing::info!("Connected to system bus as {}", conn.unique_name());
        Ok(Self {
            conn,
            timeout,
            matches: Mutex::new(Vec::new()),
            io_task,
        })
    }

    fn proxy(&self, path: &str) -> Result<Proxy<'_, Arc<SyncConnection>>, BusError> {
        let object = Path::new(path).map_err(|_| BusError::InvalidPath(path.to_string()))?;
        Ok(Proxy::new(BLUEZ_SERVICE, object, self.timeout, self.conn.clone()))
    }

    fn remember(&self, signal_match: MsgMatch) {
        if let Ok(mut matches) = self.matches.lock() {
            matches.push(signal_match);
        }
    }

    /// Unique connection name currently owning `org.bluez`.
    async fn bluez_owner(&self) -> Result<String, BusError> {
        let proxy = Proxy::new(DBUS_SERVICE, DBUS_PATH, self.timeout, self.conn.clone());
        let (owner,): (String,) = proxy
            .method_call(DBUS_SERVICE, "GetNameOwner", (BLUEZ_SERVICE,))
            .await?;
        Ok(owner)
    }
}

#[async_trait]
impl BusSession for BluezSession {
    async fn subscribe(&self, sink: mpsc::UnboundedSender<BusSignal>) -> Result<(), BusError> {
        // Signals carry the unique name, so scope by the current owner of org.bluez.
        let owner = self.bluez_owner().await?;
        tracing::debug!("{} is owned by {}", BLUEZ_SERVICE, owner);

        let changed_sink = sink.clone();
        let changed_owner = owner.clone();
        let changed = self
            .conn
            .add_match(MatchRule::new_signal(PROPERTIES_INTERFACE, "PropertiesChanged"))
            .await?
            .msg_cb(move |msg: Message| {
                let sender = msg.sender();
                if sent_by(sender.as_deref(), &changed_owner) {
                    if let Some(signal) = parse_properties_changed(&msg) {
                        let _ = changed_sink.send(signal);
                    }
                }
                true
            });
        self.remember(changed);

        let added = self
            .conn
            .add_match(MatchRule::new_signal(OBJECT_MANAGER_INTERFACE, "InterfacesAdded"))
            .await?
            .msg_cb(move |msg: Message| {
                let sender = msg.sender();
                if sent_by(sender.as_deref(), &owner) {
                    if let Some(signal) = parse_interfaces_added(&msg) {
                        let _ = sink.send(signal);
                    }
                }
                true
            });
        self.remember(added);

        tracing::debug!("Subscribed to BlueZ signals");
        Ok(())
    }

    async fn managed_objects(&self) -> Result<Vec<ManagedObject>, BusError> {
        let objects = self.proxy("/")?.get_managed_objects().await?;
        let mut managed: Vec<ManagedObject> = objects
            .iter()
            .map(|(path, interfaces)| ManagedObject {
                path: path.to_string(),
                capabilities: capabilities(interfaces),
            })
            .filter(|object| !object.capabilities.is_empty())
            .collect();
        managed.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(managed)
    }

    async fn set_adapter(&self, adapter: &str, setting: AdapterSetting) -> Result<(), BusError> {
        let proxy = self.proxy(adapter)?;
        let property = setting.property();
        match setting {
            AdapterSetting::Powered(value) | AdapterSetting::Discoverable(value) => {
                proxy.set(ADAPTER_INTERFACE, property, value).await?
            }
            AdapterSetting::DiscoverableTimeout(secs) => {
                proxy.set(ADAPTER_INTERFACE, property, secs).await?
            }
        }
        Ok(())
    }

    async fn call(&self, path: &str, method: MethodCall) -> Result<(), BusError> {
        let interface = if method.targets_adapter() {
            ADAPTER_INTERFACE
        } else {
            DEVICE_INTERFACE
        };
        let _: () = self
            .proxy(path)?
            .method_call(interface, method.member(), ())
            .await?;
        Ok(())
    }

    async fn device_paired(&self, device: &str) -> Result<bool, BusError> {
        Ok(self.proxy(device)?.get(DEVICE_INTERFACE, "Paired").await?)
    }

    async fn bind_player(&self, player: &str) -> Result<(), BusError> {
        // Proxies are created per call; binding only needs a usable path.
        self.proxy(player).map(|_| ())
    }

    async fn player_properties(&self, player: &str) -> Result<PlayerProperties, BusError> {
        let props = self.proxy(player)?.get_all(MEDIA_PLAYER_INTERFACE).await?;
        Ok(player_properties(&props))
    }

    async fn close(&self) {
        let matches: Vec<MsgMatch> = match self.matches.lock() {
            Ok(mut matches) => matches.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for signal_match in matches {
            if let Err(e) = self.conn.remove_match(signal_match.token()).await {
                tracing::debug!("Failed to remove signal match: {}", e);
            }
        }
        self.io_task.abort();
    }
}

fn sent_by(sender: Option<&str>, owner: &str) -> bool {
    sender == Some(owner)
}

fn parse_properties_changed(msg: &Message) -> Option<BusSignal> {
    let path = msg.path()?.to_string();
    let (interface, changed, _invalidated): (String, PropMap, Vec<String>) = msg.read3().ok()?;
    let change = match interface.as_str() {
        ADAPTER_INTERFACE => PropertyChange::Adapter(adapter_properties(&changed)),
        DEVICE_INTERFACE => PropertyChange::Device(device_properties(&changed)),
        MEDIA_PLAYER_INTERFACE => PropertyChange::MediaPlayer,
        _ => return None,
    };
    Some(BusSignal::PropertiesChanged { path, change })
}

fn parse_interfaces_added(msg: &Message) -> Option<BusSignal> {
    let (object, interfaces): (Path, HashMap<String, PropMap>) = msg.read2().ok()?;
    let capabilities = capabilities(&interfaces);
    if capabilities.is_empty() {
        return None;
    }
    Some(BusSignal::InterfacesAdded {
        path: object.to_string(),
        capabilities,
    })
}

fn capabilities(interfaces: &HashMap<String, PropMap>) -> Vec<Capability> {
    let mut found = Vec::new();
    if let Some(props) = interfaces.get(ADAPTER_INTERFACE) {
        found.push(Capability::Adapter(adapter_properties(props)));
    }
    if let Some(props) = interfaces.get(DEVICE_INTERFACE) {
        found.push(Capability::Device(device_properties(props)));
    }
    if interfaces.contains_key(MEDIA_PLAYER_INTERFACE) {
        found.push(Capability::MediaPlayer);
    }
    found
}

fn adapter_properties(props: &PropMap) -> AdapterProperties {
    AdapterProperties {
        powered: prop_cast::<bool>(props, "Powered").copied(),
        discoverable: prop_cast::<bool>(props, "Discoverable").copied(),
    }
}

fn device_properties(props: &PropMap) -> DeviceProperties {
    DeviceProperties {
        name: prop_cast::<String>(props, "Name").cloned(),
        paired: prop_cast::<bool>(props, "Paired").copied(),
        connected: prop_cast::<bool>(props, "Connected").copied(),
    }
}

fn player_properties(props: &PropMap) -> PlayerProperties {
    let track = props
        .get("Track")
        .map(|variant| &*variant.0)
        .map(|track| TrackFields {
            title: dict_text(track, "Title"),
            artist: dict_text(track, "Artist"),
            album: dict_text(track, "Album"),
        })
        .unwrap_or_default();

    PlayerProperties {
        status: prop_cast::<String>(props, "Status").cloned(),
        track,
    }
}

/// Look up a string value in an `a{sv}` that arrived as an untyped argument.
fn dict_text(dict: &dyn RefArg, key: &str) -> Option<String> {
    let mut items = dict.as_iter()?;
    while let (Some(k), Some(v)) = (items.next(), items.next()) {
        if k.as_str() == Some(key) {
            return v.as_str().map(str::to_string);
        }
    }
    None
}
