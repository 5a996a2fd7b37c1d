// Open API wire types
//
// REST endpoints wrap their payload in `{ error, data, message }`.
// Third-party events use `{ event: { header, endpoint?, payload } }` on the
// way in and `{ header, payload }` on the way out. Fields use
// `#[serde(default)]` liberally because hub firmware is inconsistent
// about field presence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under a directory entry's `tags` that carries the bridge's
/// correlation data (`{"deviceId": <mac>}`).
pub const DEVICE_INFO_TAG: &str = "deviceInfo";

/// Third-party event header names.
pub mod event_name {
    pub const DISCOVERY_REQUEST: &str = "DiscoveryRequest";
    pub const ONLINE_CHANGE: &str = "DeviceOnlineChangeReport";
    pub const STATES_CHANGE: &str = "DeviceStatesChangeReport";
    pub const RESPONSE: &str = "Response";
    pub const ERROR_RESPONSE: &str = "ErrorResponse";
}

// ── Response Envelope ────────────────────────────────────────────────

/// Standard REST response envelope.
///
/// ```json
/// { "error": 0, "data": { ... }, "message": "success" }
/// ```
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct HubResponse<T> {
    pub error: i64,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `data` of `GET /bridge/access_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub token: String,
}

/// `data` of `GET /devices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub device_list: Vec<HubDevice>,
}

// ── Directory device ─────────────────────────────────────────────────

/// One entry of the hub's device directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubDevice {
    pub serial_number: String,
    #[serde(default)]
    pub third_serial_number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_category: Option<String>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub tags: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HubDevice {
    /// Whether this directory entry was created for the device with `mac`.
    ///
    /// Matches on `tags.deviceInfo.deviceId` first and falls back to a
    /// substring search over the serialized tags, which is how entries
    /// created by older bridge versions are found.
    pub fn matches_mac(&self, mac: &str) -> bool {
        let Some(tags) = &self.tags else {
            return false;
        };
        if tags
            .get(DEVICE_INFO_TAG)
            .and_then(|info| info.get("deviceId"))
            .and_then(Value::as_str)
            == Some(mac)
        {
            return true;
        }
        !mac.is_empty() && tags.to_string().contains(mac)
    }
}

// ── Third-party events (requests) ────────────────────────────────────

/// Event header shared by requests and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHeader {
    pub name: String,
    pub message_id: String,
    pub version: String,
}

impl EventHeader {
    /// A fresh header with a random message id.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            message_id: uuid::Uuid::new_v4().to_string(),
            version: "1".into(),
        }
    }
}

/// Identifies a directory entry in state/online reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEndpoint {
    pub serial_number: String,
    pub third_serial_number: String,
}

/// `{ "event": { header, endpoint?, payload } }`
#[derive(Debug, Clone, Serialize)]
pub struct ThirdPartyEvent<P: Serialize> {
    pub event: EventBody<P>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventBody<P: Serialize> {
    pub header: EventHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EventEndpoint>,
    pub payload: P,
}

impl<P: Serialize> ThirdPartyEvent<P> {
    pub fn new(name: &str, endpoint: Option<EventEndpoint>, payload: P) -> Self {
        Self {
            event: EventBody {
                header: EventHeader::new(name),
                endpoint,
                payload,
            },
        }
    }
}

/// A device offered to the hub in a `DiscoveryRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEndpoint {
    pub third_serial_number: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub display_category: String,
    pub capabilities: Value,
    pub state: Value,
    pub tags: Value,
    pub service_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryPayload {
    pub endpoints: Vec<DiscoveryEndpoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnlinePayload {
    pub online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub state: Value,
}

// ── Third-party events (responses) ───────────────────────────────────

/// Response to `POST /thirdparty/event`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventResponse {
    #[serde(default)]
    pub header: Option<EventHeader>,
    #[serde(default)]
    pub payload: EventResponsePayload,
}

/// Success responses carry `endpoints` (creation) or nothing; errors
/// carry only `type` and `description`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventResponsePayload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<EventEndpoint>,
}

impl EventResponse {
    pub fn is_error(&self) -> bool {
        self.header
            .as_ref()
            .is_some_and(|h| h.name == event_name::ERROR_RESPONSE)
            || self.payload.kind.is_some()
            || self.payload.description.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(tags: Value) -> HubDevice {
        serde_json::from_value(json!({ "serial_number": "s1", "tags": tags })).unwrap()
    }

    #[test]
    fn matches_mac_via_device_info_tag() {
        let dev = device(json!({ "deviceInfo": { "deviceId": "A4CF12F0E1D2" } }));
        assert!(dev.matches_mac("A4CF12F0E1D2"));
        assert!(!dev.matches_mac("A4CF12000000"));
    }

    #[test]
    fn matches_mac_via_serialized_tags() {
        let dev = device(json!({ "legacy": "mac=A4CF12F0E1D2" }));
        assert!(dev.matches_mac("A4CF12F0E1D2"));
    }

    #[test]
    fn untagged_device_never_matches() {
        let dev: HubDevice = serde_json::from_value(json!({ "serial_number": "s1" })).unwrap();
        assert!(!dev.matches_mac("A4CF12F0E1D2"));
        assert!(!dev.matches_mac(""));
    }

    #[test]
    fn report_event_serializes_endpoint() {
        let event = ThirdPartyEvent::new(
            event_name::ONLINE_CHANGE,
            Some(EventEndpoint {
                serial_number: "s1".into(),
                third_serial_number: "A4CF12F0E1D2".into(),
            }),
            OnlinePayload { online: true },
        );
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["event"]["header"]["name"], "DeviceOnlineChangeReport");
        assert_eq!(v["event"]["header"]["version"], "1");
        assert_eq!(v["event"]["endpoint"]["serial_number"], "s1");
        assert_eq!(v["event"]["payload"]["online"], true);
    }

    #[test]
    fn discovery_event_omits_endpoint() {
        let event = ThirdPartyEvent::new(
            event_name::DISCOVERY_REQUEST,
            None,
            DiscoveryPayload { endpoints: vec![] },
        );
        let v = serde_json::to_value(&event).unwrap();
        assert!(v["event"].get("endpoint").is_none());
    }

    #[test]
    fn error_response_detected_from_payload_type() {
        let resp: EventResponse = serde_json::from_value(json!({
            "header": { "name": "ErrorResponse", "message_id": "m", "version": "1" },
            "payload": { "type": "INVALID_PARAMETERS", "description": "bad" }
        }))
        .unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.payload.kind.as_deref(), Some("INVALID_PARAMETERS"));
    }

    #[test]
    fn empty_success_response_is_not_error() {
        let resp: EventResponse = serde_json::from_value(json!({
            "header": { "name": "Response", "message_id": "m", "version": "1" },
            "payload": {}
        }))
        .unwrap();
        assert!(!resp.is_error());
    }
}
