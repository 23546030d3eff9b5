/*!
 * Media Player Binding
 * At most one bound BlueZ MediaPlayer1, refetched wholesale on every change
 */

use crate::bus::BusSession;

use super::Engine;

impl<B: BusSession> Engine<B> {
    pub(super) async fn attach_player(&mut self, path: &str) {
        match self.bus.bind_player(path).await {
            Ok(()) => {
                tracing::info!("Connected to media player at {}", path);
                self.state.write().await.bind_player(path);
                self.fetch_player().await;
            }
            Err(e) => {
                tracing::warn!("Failed to connect to player at {}: {}", path, e);
                self.state.write().await.unbind_player();
            }
        }
    }

    /// Refresh status and track from the bound player. No-op when unbound.
    pub(super) async fn fetch_player(&mut self) {
        let Some(player) = self.state.read().await.player().map(str::to_string) else {
            return;
        };

        match self.bus.player_properties(&player).await {
            Ok(props) => {
                tracing::debug!("Player properties at {}: {:?}", player, props);
                self.state.write().await.apply_player(props);
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.record_error(format!("Error getting player properties: {e}"));
                state.player_lost();
            }
        }
    }

    /// Fallback for missed `InterfacesAdded`: bind the first player on the bus.
    pub(super) async fn find_existing_player(&mut self) {
        if self.state.read().await.player().is_some() {
            return;
        }

        match self.bus.managed_objects().await {
            Ok(objects) => {
                if let Some(object) = objects.iter().find(|object| object.is_media_player()) {
                    self.attach_player(&object.path).await;
                }
            }
            Err(e) => tracing::debug!("Error finding player: {}", e),
        }
    }
}
