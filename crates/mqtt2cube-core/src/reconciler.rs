// ── State reconciliation ──
//
// Every non-discovery message is offered to every cached device; each
// category handler decides relevance from the device's own topics. The
// fan-out is linear in the registry size.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::InboundMessage;
use crate::context::SyncContext;
use crate::model::{
    BridgeEvent, DeviceModel, MacAddress, PowerState, SwitchDevice, SwitchState,
    UnsupportedDevice,
};

const SET_OPTION: &str = "setoption";

/// What a switch should do with a message on one of its topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchRoute {
    Availability,
    Power,
    SetOption,
}

pub struct StateReconciler {
    ctx: Arc<SyncContext>,
}

impl StateReconciler {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Offer `msg` to every cached device.
    pub async fn dispatch(&self, msg: &InboundMessage) {
        let devices = self.ctx.registry.list();
        for device in devices.iter() {
            match device.as_ref() {
                DeviceModel::Switch(switch) => self.handle_switch(switch, msg).await,
                DeviceModel::Unsupported(device) => self.handle_unsupported(device, msg),
            }
        }
    }

    // ── Switch ───────────────────────────────────────────────────────

    async fn handle_switch(&self, switch: &SwitchDevice, msg: &InboundMessage) {
        let Some(route) = route_switch(switch, msg) else {
            return;
        };
        let mac = &switch.common.mac;
        debug!(mac = %mac, topic = %msg.topic, ?route, "switch message");

        match route {
            SwitchRoute::Availability => {
                let online = msg.payload.as_str() == Some(switch.common.online_literal.as_str());
                self.apply_online(mac, online).await;
            }
            SwitchRoute::Power => {
                let Some(delta) = power_delta(switch, msg) else {
                    return;
                };
                self.ctx.update_device(mac, |model| {
                    if let DeviceModel::Switch(s) = model {
                        s.state.merge(&delta);
                    }
                });
                let Some(entry) = self.ctx.directory_entry(mac).await else {
                    return;
                };
                if let Err(e) = self.ctx.hub.report_state(&entry, mac, delta.to_value()).await {
                    warn!(mac = %mac, error = %e, "state push failed");
                }
            }
            SwitchRoute::SetOption => {
                let Some((key, value)) = set_option_update(switch, msg) else {
                    return;
                };
                info!(mac = %mac, option = %key, value, "set option changed");
                self.ctx.update_device(mac, |model| {
                    model.common_mut().set_options.insert(key, value);
                });
            }
        }
    }

    // ── Unsupported ──────────────────────────────────────────────────

    fn handle_unsupported(&self, device: &UnsupportedDevice, msg: &InboundMessage) {
        let common = &device.common;
        if !msg.topic.eq_ignore_ascii_case(&common.topics.availability) {
            return;
        }
        let online = msg.payload.as_str() == Some(common.online_literal.as_str());
        debug!(mac = %common.mac, online, "unsupported device availability");
        self.ctx.update_device(&common.mac, |model| {
            model.common_mut().online = online;
        });
    }

    // ── Shared ───────────────────────────────────────────────────────

    async fn apply_online(&self, mac: &MacAddress, online: bool) {
        info!(mac = %mac, online, "device availability changed");
        self.ctx.update_device(mac, |model| model.common_mut().online = online);
        self.ctx.emit(BridgeEvent::OnlineStatus {
            device_id: mac.clone(),
            online,
        });

        let Some(entry) = self.ctx.directory_entry(mac).await else {
            return;
        };
        if let Err(e) = self.ctx.hub.report_online(&entry, mac, online).await {
            warn!(mac = %mac, error = %e, "online push failed");
        }
    }
}

// ── Routing ──────────────────────────────────────────────────────────

fn route_switch(switch: &SwitchDevice, msg: &InboundMessage) -> Option<SwitchRoute> {
    let topics = &switch.common.topics;
    let topic = msg.topic.as_str();

    if topic.eq_ignore_ascii_case(&topics.availability) {
        return Some(SwitchRoute::Availability);
    }
    if topics
        .power_topics
        .iter()
        .any(|t| t.eq_ignore_ascii_case(topic))
    {
        return Some(SwitchRoute::Power);
    }

    let lower = topic.to_lowercase();
    if lower.contains(SET_OPTION) {
        return owns_topic(switch, &lower).then_some(SwitchRoute::SetOption);
    }

    if topic.eq_ignore_ascii_case(&topics.state_topic) || topic.eq_ignore_ascii_case(&topics.result)
    {
        let keys = msg.payload.as_object()?;
        let lowered: Vec<String> = keys.keys().map(|k| k.to_lowercase()).collect();
        if lowered.iter().any(|k| k.contains("power")) {
            return Some(SwitchRoute::Power);
        }
        if lowered.iter().any(|k| k.contains(SET_OPTION)) {
            return Some(SwitchRoute::SetOption);
        }
    }
    None
}

/// Whether a lowercased topic lives under this device's state or command prefix.
fn owns_topic(switch: &SwitchDevice, lower: &str) -> bool {
    let topics = &switch.common.topics;
    [&topics.state_prefix, &topics.command]
        .iter()
        .any(|prefix| !prefix.is_empty() && lower.starts_with(&prefix.to_lowercase()))
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Channels reported by a power message. Only JSON objects count: the
/// plain-text copy of the same report is ignored.
fn power_delta(switch: &SwitchDevice, msg: &InboundMessage) -> Option<SwitchState> {
    let fields = msg.payload.as_object()?;

    match &switch.state {
        SwitchState::Power(_) => {
            let literal = fields.get("POWER").and_then(Value::as_str)?;
            let state = if literal == switch.power_on {
                PowerState::On
            } else {
                PowerState::Off
            };
            Some(SwitchState::Power(state))
        }
        SwitchState::Toggle(channels) => {
            let delta: BTreeMap<u8, PowerState> = channels
                .keys()
                .filter_map(|&channel| {
                    let literal = fields.get(format!("POWER{channel}").as_str())?.as_str()?;
                    switch.parse_power(literal).map(|state| (channel, state))
                })
                .collect();
            (!delta.is_empty()).then_some(SwitchState::Toggle(delta))
        }
    }
}

/// `(option number, value)` from a `{"SetOption<n>": "ON"|"OFF"}` payload,
/// for options the device announced.
fn set_option_update(switch: &SwitchDevice, msg: &InboundMessage) -> Option<(String, i64)> {
    let fields = msg.payload.as_object()?;
    let (first_key, raw) = fields.iter().next()?;
    let first_key = first_key.to_lowercase();
    let value = i64::from(raw.as_str() == Some("ON"));

    switch
        .common
        .set_options
        .keys()
        .find(|key| format!("{SET_OPTION}{key}") == first_key)
        .map(|key| (key.clone(), value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connection::Payload;
    use crate::context::tests::{Harness, harness};
    use crate::discovery::build_device;
    use crate::hub::tests::API_ROOT;
    use crate::model::DiscoveryMessage;
    use crate::model::discovery::tests::{dual_relay, single_relay};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MAC: &str = "A4CF12F0E1D2";

    fn seed(h: &Harness, value: serde_json::Value) {
        let msg: DiscoveryMessage = serde_json::from_value(value).unwrap();
        h.ctx.registry.replace(build_device(&msg));
    }

    fn text(topic: &str, payload: &str) -> InboundMessage {
        InboundMessage::new(topic, Payload::Text(payload.into()))
    }

    fn json_msg(topic: &str, payload: serde_json::Value) -> InboundMessage {
        InboundMessage::new(topic, Payload::Json(payload))
    }

    fn cached(h: &Harness) -> SwitchDevice {
        h.ctx
            .registry
            .get(&MacAddress::new(MAC))
            .unwrap()
            .as_switch()
            .unwrap()
            .clone()
    }

    async fn mount_directory(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("{API_ROOT}/devices")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 0,
                "data": { "device_list": [{
                    "serial_number": "hub-1",
                    "tags": { "deviceInfo": { "deviceId": MAC } }
                }]},
                "message": "success"
            })))
            .mount(server)
            .await;
    }

    fn event_ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "header": { "name": "Response", "message_id": "m", "version": "1" },
            "payload": {}
        }))
    }

    #[tokio::test]
    async fn online_literal_flips_device_online() {
        let server = MockServer::start().await;
        let mut h = harness(&server, None);
        seed(&h, single_relay());

        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&text("tele/tasmota_F0E1D2/LWT", "Online"))
            .await;

        assert!(cached(&h).common.online);
        assert_eq!(
            h.drain_events(),
            vec![BridgeEvent::OnlineStatus {
                device_id: MacAddress::new(MAC),
                online: true,
            }]
        );
    }

    #[tokio::test]
    async fn availability_is_pushed_when_device_is_in_hub() {
        let server = MockServer::start().await;
        mount_directory(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{API_ROOT}/thirdparty/event")))
            .and(body_partial_json(json!({
                "event": {
                    "header": { "name": "DeviceOnlineChangeReport" },
                    "endpoint": { "serial_number": "hub-1", "third_serial_number": MAC },
                    "payload": { "online": false }
                }
            })))
            .respond_with(event_ok())
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, Some("tok"));
        seed(&h, single_relay());
        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&text("tele/tasmota_F0E1D2/LWT", "Offline"))
            .await;

        assert!(!cached(&h).common.online);
    }

    #[tokio::test]
    async fn single_channel_power_json_updates_and_pushes() {
        let server = MockServer::start().await;
        mount_directory(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{API_ROOT}/thirdparty/event")))
            .and(body_partial_json(json!({
                "event": {
                    "header": { "name": "DeviceStatesChangeReport" },
                    "payload": { "state": { "power": { "powerState": "on" } } }
                }
            })))
            .respond_with(event_ok())
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, Some("tok"));
        seed(&h, single_relay());
        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&json_msg("stat/tasmota_F0E1D2/RESULT", json!({ "POWER": "ON" })))
            .await;

        assert_eq!(cached(&h).state, SwitchState::Power(PowerState::On));
    }

    #[tokio::test]
    async fn text_power_report_is_ignored() {
        let server = MockServer::start().await;
        let h = harness(&server, None);
        seed(&h, single_relay());

        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&text("stat/tasmota_F0E1D2/POWER", "ON"))
            .await;

        assert_eq!(cached(&h).state, SwitchState::Power(PowerState::Off));
    }

    #[tokio::test]
    async fn multi_channel_updates_only_reported_channels() {
        let server = MockServer::start().await;
        let h = harness(&server, None);
        seed(&h, dual_relay());

        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&json_msg(
                "tele/tasmota_F0E1D2/STATE",
                json!({ "POWER1": "ON", "POWER2": "BLINK", "Wifi": {} }),
            ))
            .await;

        assert_eq!(
            cached(&h).state,
            SwitchState::Toggle(BTreeMap::from([(1, PowerState::On), (2, PowerState::Off)]))
        );
    }

    #[tokio::test]
    async fn other_devices_topics_are_ignored() {
        let server = MockServer::start().await;
        let mut h = harness(&server, None);
        seed(&h, single_relay());

        let reconciler = StateReconciler::new(Arc::clone(&h.ctx));
        reconciler
            .dispatch(&json_msg("stat/other/RESULT", json!({ "POWER": "ON" })))
            .await;
        reconciler.dispatch(&text("tele/other/LWT", "Online")).await;

        assert_eq!(cached(&h).state, SwitchState::Power(PowerState::Off));
        assert!(h.drain_events().is_empty());
    }

    #[tokio::test]
    async fn set_option_result_updates_option_map() {
        let server = MockServer::start().await;
        let h = harness(&server, None);
        seed(&h, dual_relay());

        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&json_msg("stat/tasmota_F0E1D2/RESULT", json!({ "SetOption4": "ON" })))
            .await;
        assert_eq!(cached(&h).common.set_option("4"), 1);

        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&json_msg(
                "stat/tasmota_F0E1D2/SETOPTION4",
                json!({ "SetOption4": "OFF" }),
            ))
            .await;
        assert_eq!(cached(&h).common.set_option("4"), 0);
    }

    #[tokio::test]
    async fn unsupported_device_tracks_availability_only() {
        let server = MockServer::start().await;
        let mut h = harness(&server, Some("tok"));
        let mut value = dual_relay();
        value["rl"] = json!([0]);
        seed(&h, value);

        StateReconciler::new(Arc::clone(&h.ctx))
            .dispatch(&text("tele/tasmota_F0E1D2/LWT", "Online"))
            .await;

        let device = h.ctx.registry.get(&MacAddress::new(MAC)).unwrap();
        assert!(device.online());
        assert!(h.drain_events().is_empty());
    }
}
