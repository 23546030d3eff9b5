use crate::bus::{BusSession, BusSignal, Capability, PropertyChange};

use super::Engine;

impl<B: BusSession> Engine<B> {
    pub(super) async fn handle_signal(&mut self, signal: BusSignal) {
        match signal {
            BusSignal::PropertiesChanged { path, change } => match change {
                PropertyChange::Device(props) => {
                    tracing::debug!("Device properties changed at {}: {:?}", path, props);
                    self.state.write().await.apply_device_change(&path, &props);
                }
                PropertyChange::Adapter(props) => {
                    self.state.write().await.apply_adapter_change(&path, &props);
                }
                PropertyChange::MediaPlayer => {
                    let bound = self.state.read().await.player().is_some();
                    if bound {
                        self.fetch_player().await;
                    } else {
                        self.schedule_attach(&path);
                    }
                }
            },
            BusSignal::InterfacesAdded { path, capabilities } => {
                for capability in capabilities {
                    match capability {
                        Capability::Device(props) => {
                            self.state.write().await.insert_device(&path, &props);
                        }
                        Capability::MediaPlayer => {
                            tracing::info!("Media player interface added at {}", path);
                            self.schedule_attach(&path);
                        }
                        Capability::Adapter(_) => {}
                    }
                }
            }
        }
    }
}
