use std::time::Duration;

/// Tunables for the engine run loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often to look for a media player while none is bound.
    pub player_poll_interval: Duration,
    /// Pause between `Pair` and `Connect` for devices that were not yet paired.
    pub pair_settle_delay: Duration,
    /// Written to the adapter's `DiscoverableTimeout`; 0 never expires.
    pub discoverable_timeout: u32,
    pub command_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            player_poll_interval: Duration::from_secs(2),
            pair_settle_delay: Duration::from_secs(2),
            discoverable_timeout: 0,
            command_queue: 32,
        }
    }
}
