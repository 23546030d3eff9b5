use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] dbus::Error),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No Bluetooth adapter found")]
    NoAdapterFound,

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Command queue is full")]
    QueueFull,

    #[error("Engine is not running")]
    Stopped,
}
