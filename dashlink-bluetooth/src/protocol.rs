/*!
 * DASHLINK IPC Protocol
 * One JSON object per line over the daemon's Unix socket
 */

use serde::{Deserialize, Serialize};

use crate::model::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Snapshot,
    ToggleDiscovery,
    PairAndConnect { path: String },
    Disconnect { path: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Snapshot { snapshot: Snapshot },
    Accepted,
    Error { message: String },
}
