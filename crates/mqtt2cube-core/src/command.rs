// ── Bridge commands ──
//
// Requests from the API call path, executed one at a time by the
// bridge's event loop alongside MQTT traffic.

use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::model::{ControlDirective, ControlResponse, DeviceSummary, MacAddress};

#[derive(Debug, Clone)]
pub enum Command {
    DeviceList,
    SyncDevice(MacAddress),
    SyncAll,
    UnsyncDevice(MacAddress),
    Control(Box<ControlDirective>),
    /// Drop every cached device before a new session starts.
    InvalidateCache,
}

#[derive(Debug, Clone)]
pub enum CommandResult {
    Ok,
    Devices(Vec<DeviceSummary>),
    Synced(Vec<MacAddress>),
    Control(ControlResponse),
}

/// A command paired with the channel its result goes back on.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<Result<CommandResult, CoreError>>,
}
