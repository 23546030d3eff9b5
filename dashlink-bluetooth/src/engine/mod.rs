/*!
 * Bluetooth Engine
 * Single run loop that owns the bus session and serializes every bus call
 */

mod commands;
mod ingest;
mod player;

#[cfg(test)]
mod tests;

pub use commands::Command;

use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::bus::{AdapterProperties, AdapterSetting, BusSession, BusSignal, ManagedObject};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::handle::EngineHandle;
use crate::model::Status;
use crate::projection::Projection;

pub struct Engine<B: BusSession> {
    bus: B,
    config: EngineConfig,
    state: Arc<RwLock<Projection>>,
    adapter: Option<String>,
    signals_tx: mpsc::UnboundedSender<BusSignal>,
    signals: mpsc::UnboundedReceiver<BusSignal>,
    attach_tx: mpsc::UnboundedSender<String>,
    attach: mpsc::UnboundedReceiver<String>,
    commands: mpsc::Receiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl<B: BusSession> Engine<B> {
    pub fn new(bus: B, config: EngineConfig) -> (Self, EngineHandle) {
        let state = Arc::new(RwLock::new(Projection::default()));
        let (commands_tx, commands) = mpsc::channel(config.command_queue.max(1));
        let (shutdown_tx, shutdown) = watch::channel(false);
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let (attach_tx, attach) = mpsc::unbounded_channel();

        let handle = EngineHandle::new(state.clone(), commands_tx, Arc::new(shutdown_tx));
        let engine = Self {
            bus,
            config,
            state,
            adapter: None,
            signals_tx,
            signals,
            attach_tx,
            attach,
            commands,
            shutdown,
        };
        (engine, handle)
    }

    /// Start the engine on the current tokio runtime.
    pub fn spawn(
        bus: B,
        config: EngineConfig,
    ) -> (EngineHandle, JoinHandle<Result<(), EngineError>>) {
        let (engine, handle) = Self::new(bus, config);
        (handle, tokio::spawn(engine.run()))
    }

    pub async fn run(mut self) -> Result<(), EngineError> {
        if let Err(e) = self.initialize().await {
            if !matches!(e, EngineError::NoAdapterFound) {
                let mut state = self.state.write().await;
                state.record_error(format!("Bluetooth initialization failed: {e}"));
                state.set_status(Status::Failed);
            }
            tracing::error!("Bluetooth engine halted: {}", e);
            self.bus.close().await;
            return Err(e);
        }

        let period = self.config.player_poll_interval;
        let mut poll = time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                Some(signal) = self.signals.recv() => self.handle_signal(signal).await,
                Some(command) = self.commands.recv() => self.dispatch(command).await,
                Some(player) = self.attach.recv() => self.attach_player(&player).await,
                _ = poll.tick() => self.find_existing_player().await,
            }
        }

        tracing::info!("Bluetooth engine stopping");
        self.bus.close().await;
        Ok(())
    }

    async fn initialize(&mut self) -> Result<(), EngineError> {
        let objects = match self.bus.managed_objects().await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!("Error finding adapter: {}", e);
                Vec::new()
            }
        };
        let Some((adapter, props)) = find_adapter(&objects) else {
            self.state.write().await.set_status(Status::NoAdapter);
            return Err(EngineError::NoAdapterFound);
        };

        tracing::info!("Found adapter at {}", adapter);
        self.state.write().await.set_adapter(&adapter, &props);
        self.configure_adapter(&adapter).await;
        self.adapter = Some(adapter);

        // Subscribe before enumerating so nothing falls between the two.
        self.bus.subscribe(self.signals_tx.clone()).await?;
        let objects = self.bus.managed_objects().await?;
        self.seed(&objects).await;

        let mut state = self.state.write().await;
        if state.connected.is_none() {
            state.set_status(Status::Ready);
        }
        Ok(())
    }

    async fn configure_adapter(&self, adapter: &str) {
        let settings = [
            AdapterSetting::Powered(true),
            AdapterSetting::Discoverable(true),
            AdapterSetting::DiscoverableTimeout(self.config.discoverable_timeout),
        ];
        for setting in settings {
            if let Err(e) = self.bus.set_adapter(adapter, setting).await {
                tracing::warn!("Error configuring adapter ({}): {}", setting.property(), e);
                return;
            }
        }

        let configured = AdapterProperties {
            powered: Some(true),
            discoverable: Some(true),
        };
        self.state.write().await.apply_adapter_change(adapter, &configured);
        tracing::info!("Adapter configured");
    }

    async fn seed(&self, objects: &[ManagedObject]) {
        {
            let mut state = self.state.write().await;
            for object in objects {
                if let Some(props) = object.device() {
                    state.insert_device(&object.path, props);
                }
            }
        }

        for object in objects.iter().filter(|object| object.is_media_player()) {
            tracing::info!("Found media player at {}", object.path);
            self.schedule_attach(&object.path);
        }
    }

    /// Queue a player attach behind whatever the loop is already handling.
    fn schedule_attach(&self, path: &str) {
        let _ = self.attach_tx.send(path.to_string());
    }
}

fn find_adapter(objects: &[ManagedObject]) -> Option<(String, AdapterProperties)> {
    objects
        .iter()
        .find_map(|object| object.adapter().map(|props| (object.path.clone(), props.clone())))
}
