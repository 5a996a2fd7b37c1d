// ── UI events ──
//
// Push notifications for the management UI. Serialized as
// `{"name": "<event>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use super::device::DeviceSummary;
use super::mac::MacAddress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum BridgeEvent {
    #[serde(rename = "new_device_report")]
    NewDevice(DeviceSummary),

    #[serde(rename = "un_sync_report")]
    UnSync(DeviceSummary),

    #[serde(rename = "device_name_changed_report")]
    NameChanged {
        #[serde(rename = "deviceId")]
        device_id: MacAddress,
        name: String,
    },

    #[serde(rename = "device_online_status_report")]
    OnlineStatus {
        #[serde(rename = "deviceId")]
        device_id: MacAddress,
        online: bool,
    },

    #[serde(rename = "mqtt_connected_report")]
    MqttConnected {},

    #[serde(rename = "mqtt_disconnect_report")]
    MqttDisconnected {},

    #[serde(rename = "sync_success_report")]
    SyncSuccess {
        #[serde(rename = "successList")]
        success_list: Vec<MacAddress>,
    },
}

impl BridgeEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewDevice(_) => "new_device_report",
            Self::UnSync(_) => "un_sync_report",
            Self::NameChanged { .. } => "device_name_changed_report",
            Self::OnlineStatus { .. } => "device_online_status_report",
            Self::MqttConnected {} => "mqtt_connected_report",
            Self::MqttDisconnected {} => "mqtt_disconnect_report",
            Self::SyncSuccess { .. } => "sync_success_report",
        }
    }
}
