/*!
 * In-Memory Bus
 * Scriptable stand-in for BlueZ that records every call the engine makes
 */

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::bus::{
    AdapterProperties, AdapterSetting, BusSession, BusSignal, Capability, DeviceProperties,
    ManagedObject, MethodCall, PlayerProperties,
};
use crate::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Subscribe,
    ManagedObjects,
    SetAdapter(String, AdapterSetting),
    Method(String, MethodCall),
    DevicePaired(String),
    BindPlayer(String),
    PlayerProperties(String),
    Close,
}

#[derive(Default)]
struct MockState {
    objects: Vec<ManagedObject>,
    players: HashMap<String, PlayerProperties>,
    failing: HashSet<MethodCall>,
    fail_subscribe: bool,
    fail_settings: bool,
    calls: Vec<BusCall>,
    sink: Option<mpsc::UnboundedSender<BusSignal>>,
}

/// Clones share state, so a test can keep one while the engine owns another.
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockState>>,
}

fn failure(name: &str, message: &str) -> BusError {
    BusError::Dbus(dbus::Error::new_custom(name, message))
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_adapter(self, path: &str) -> Self {
        self.add_object(
            path,
            vec![Capability::Adapter(AdapterProperties {
                powered: Some(false),
                discoverable: Some(false),
            })],
        );
        self
    }

    pub fn with_device(self, path: &str, name: &str, paired: bool, connected: bool) -> Self {
        self.add_object(
            path,
            vec![Capability::Device(DeviceProperties {
                name: Some(name.to_string()),
                paired: Some(paired),
                connected: Some(connected),
            })],
        );
        self
    }

    pub fn with_player(self, path: &str, props: PlayerProperties) -> Self {
        self.add_player(path, props);
        self
    }

    pub fn add_object(&self, path: &str, capabilities: Vec<Capability>) {
        let mut state = self.state();
        state.objects.retain(|object| object.path != path);
        state.objects.push(ManagedObject {
            path: path.to_string(),
            capabilities,
        });
        state.objects.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Expose a media player object that answers property fetches.
    pub fn add_player(&self, path: &str, props: PlayerProperties) {
        self.add_object(path, vec![Capability::MediaPlayer]);
        self.state().players.insert(path.to_string(), props);
    }

    /// Make the player vanish; later fetches fail.
    pub fn remove_player(&self, path: &str) {
        let mut state = self.state();
        state.objects.retain(|object| object.path != path);
        state.players.remove(path);
    }

    pub fn fail(&self, method: MethodCall) {
        self.state().failing.insert(method);
    }

    pub fn fail_subscribe(&self) {
        self.state().fail_subscribe = true;
    }

    pub fn fail_settings(&self) {
        self.state().fail_settings = true;
    }

    /// Deliver a signal as if BlueZ emitted it. False before `subscribe`.
    pub fn emit(&self, signal: BusSignal) -> bool {
        match &self.state().sink {
            Some(sink) => sink.send(signal).is_ok(),
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<BusCall> {
        self.state().calls.clone()
    }

    pub fn method_calls(&self) -> Vec<(String, MethodCall)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                BusCall::Method(path, method) => Some((path.clone(), *method)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BusCall) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl BusSession for MockBus {
    async fn subscribe(&self, sink: mpsc::UnboundedSender<BusSignal>) -> Result<(), BusError> {
        let mut state = self.record(BusCall::Subscribe);
        if state.fail_subscribe {
            return Err(failure("org.freedesktop.DBus.Error.AccessDenied", "Match rule rejected"));
        }
        state.sink = Some(sink);
        Ok(())
    }

    async fn managed_objects(&self) -> Result<Vec<ManagedObject>, BusError> {
        Ok(self.record(BusCall::ManagedObjects).objects.clone())
    }

    async fn set_adapter(&self, adapter: &str, setting: AdapterSetting) -> Result<(), BusError> {
        let state = self.record(BusCall::SetAdapter(adapter.to_string(), setting));
        if state.fail_settings {
            return Err(failure("org.bluez.Error.NotReady", "Resource Not Ready"));
        }
        Ok(())
    }

    async fn call(&self, path: &str, method: MethodCall) -> Result<(), BusError> {
        let state = self.record(BusCall::Method(path.to_string(), method));
        if state.failing.contains(&method) {
            return Err(failure("org.bluez.Error.Failed", "Operation failed"));
        }
        Ok(())
    }

    async fn device_paired(&self, device: &str) -> Result<bool, BusError> {
        let state = self.record(BusCall::DevicePaired(device.to_string()));
        state
            .objects
            .iter()
            .find(|object| object.path == device)
            .and_then(ManagedObject::device)
            .map(|props| props.paired.unwrap_or(false))
            .ok_or_else(|| failure("org.freedesktop.DBus.Error.UnknownObject", device))
    }

    async fn bind_player(&self, player: &str) -> Result<(), BusError> {
        self.record(BusCall::BindPlayer(player.to_string()));
        if player.is_empty() {
            return Err(BusError::InvalidPath(player.to_string()));
        }
        Ok(())
    }

    async fn player_properties(&self, player: &str) -> Result<PlayerProperties, BusError> {
        let state = self.record(BusCall::PlayerProperties(player.to_string()));
        state
            .players
            .get(player)
            .cloned()
            .ok_or_else(|| failure("org.freedesktop.DBus.Error.UnknownObject", player))
    }

    async fn close(&self) {
        let mut state = self.record(BusCall::Close);
        state.sink = None;
    }
}
