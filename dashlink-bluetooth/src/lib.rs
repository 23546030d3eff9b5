/*!
 * DASHLINK Bluetooth Engine
 * Keeps a polled projection of BlueZ devices and now-playing state in sync
 * with bus signals, and runs pairing and discovery commands on one loop
 * Onyx Digital Intelligence Development LLC
 */

pub mod bluez;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod model;
pub mod projection;
pub mod protocol;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bluez::BluezSession;
pub use bus::BusSession;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{BusError, EngineError};
pub use handle::EngineHandle;
pub use model::{
    AdapterInfo, ConnectedDevice, DeviceAction, DeviceInfo, Snapshot, Status, StatusTone,
    TrackMetadata,
};
