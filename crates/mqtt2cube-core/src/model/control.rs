// ── Remote-control contract ──
//
// The hub calls the bridge with an `UpdateDeviceStates` directive naming
// a device by its correlation tag; the bridge answers with either an
// `UpdateDeviceStatesResponse` or an `ErrorResponse`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use mqtt2cube_api::models::{DEVICE_INFO_TAG, EventHeader};

use super::mac::MacAddress;

/// `{ "directive": { header, endpoint, payload } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlDirective {
    pub directive: Directive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub header: EventHeader,
    pub endpoint: DirectiveEndpoint,
    pub payload: DirectivePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveEndpoint {
    pub serial_number: String,
    #[serde(default)]
    pub third_serial_number: String,
    #[serde(default)]
    pub tags: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectivePayload {
    pub state: Value,
}

impl ControlDirective {
    pub fn message_id(&self) -> &str {
        &self.directive.header.message_id
    }

    /// Target device from `tags.deviceInfo.deviceId`.
    pub fn target(&self) -> Option<MacAddress> {
        self.directive
            .endpoint
            .tags
            .get(DEVICE_INFO_TAG)
            .and_then(|info| info.get("deviceId"))
            .and_then(Value::as_str)
            .map(MacAddress::new)
    }

    pub fn state(&self) -> &Value {
        &self.directive.payload.state
    }

    /// Requested `power.powerState`.
    pub fn power_state(&self) -> Option<&str> {
        self.state()
            .get("power")
            .and_then(|p| p.get("powerState"))
            .and_then(Value::as_str)
    }

    /// Requested `toggle.<channel>.toggleState`.
    pub fn toggle_state(&self, channel: u8) -> Option<&str> {
        self.state()
            .get("toggle")
            .and_then(|t| t.get(channel.to_string()))
            .and_then(|c| c.get("toggleState"))
            .and_then(Value::as_str)
    }
}

/// Reply sent back to the hub for a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub event: ControlResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponseBody {
    pub header: EventHeader,
    pub payload: Value,
}

impl ControlResponse {
    pub fn success(message_id: &str) -> Self {
        Self::with(message_id, "UpdateDeviceStatesResponse", json!({}))
    }

    pub fn unreachable(message_id: &str) -> Self {
        Self::with(
            message_id,
            "ErrorResponse",
            json!({ "type": "ENDPOINT_UNREACHABLE" }),
        )
    }

    pub fn is_success(&self) -> bool {
        self.event.header.name != "ErrorResponse"
    }

    fn with(message_id: &str, name: &str, payload: Value) -> Self {
        Self {
            event: ControlResponseBody {
                header: EventHeader {
                    name: name.into(),
                    message_id: message_id.into(),
                    version: "1".into(),
                },
                payload,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn directive(state: Value) -> ControlDirective {
        serde_json::from_value(json!({
            "directive": {
                "header": { "name": "UpdateDeviceStates", "message_id": "msg-1", "version": "1" },
                "endpoint": {
                    "serial_number": "hub-1",
                    "third_serial_number": "A4CF12F0E1D2",
                    "tags": { "deviceInfo": { "deviceId": "A4CF12F0E1D2" } }
                },
                "payload": { "state": state }
            }
        }))
        .unwrap()
    }

    #[test]
    fn reads_target_and_states() {
        let d = directive(json!({ "toggle": { "2": { "toggleState": "on" } } }));
        assert_eq!(d.target(), Some(MacAddress::new("A4CF12F0E1D2")));
        assert_eq!(d.message_id(), "msg-1");
        assert_eq!(d.toggle_state(2), Some("on"));
        assert_eq!(d.toggle_state(1), None);
        assert_eq!(d.power_state(), None);
    }

    #[test]
    fn response_envelopes() {
        let ok = serde_json::to_value(ControlResponse::success("msg-1")).unwrap();
        assert_eq!(
            ok,
            json!({ "event": {
                "header": { "name": "UpdateDeviceStatesResponse", "message_id": "msg-1", "version": "1" },
                "payload": {}
            }})
        );
        let err = ControlResponse::unreachable("msg-1");
        assert!(!err.is_success());
        assert_eq!(err.event.payload["type"], "ENDPOINT_UNREACHABLE");
    }
}
