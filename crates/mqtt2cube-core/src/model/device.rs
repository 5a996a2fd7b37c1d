// ── Device model ──
//
// A discovered device, keyed by MAC. Switches carry a capability/state
// shape whose size is fixed by the channel count at discovery time;
// unsupported devices only track reachability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumString};

use mqtt2cube_api::DiscoveryEndpoint;
use mqtt2cube_api::models::DEVICE_INFO_TAG;

use super::mac::MacAddress;

/// Maximum number of channels modeled per switch.
pub const MAX_CHANNELS: usize = 4;

/// Manufacturer reported to the hub for every device.
pub const MANUFACTURER: &str = "Tasmota";

// ── Category ─────────────────────────────────────────────────────────

/// Device category, derived from the first relay type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum Category {
    #[strum(serialize = "switch")]
    #[serde(rename = "switch")]
    Switch,
    #[strum(serialize = "UNKNOWN")]
    #[serde(rename = "UNKNOWN")]
    Unsupported,
}

// ── Power state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

/// Cached switch state.
///
/// The variant is chosen once from the channel count: a single-channel
/// switch has one `power` state, a multi-channel switch one `toggle`
/// state per channel (1..=N).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchState {
    Power(PowerState),
    Toggle(BTreeMap<u8, PowerState>),
}

impl SwitchState {
    /// All-off state for `channels` channels.
    pub fn initial(channels: usize) -> Self {
        if channels > 1 {
            Self::Toggle(channel_range(channels).map(|i| (i, PowerState::Off)).collect())
        } else {
            Self::Power(PowerState::Off)
        }
    }

    /// Hub representation: `{"power":{"powerState":..}}` or
    /// `{"toggle":{"1":{"toggleState":..}, ..}}`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Power(state) => json!({ "power": { "powerState": state } }),
            Self::Toggle(channels) => {
                let toggle: Map<String, Value> = channels
                    .iter()
                    .map(|(i, state)| (i.to_string(), json!({ "toggleState": state })))
                    .collect();
                json!({ "toggle": toggle })
            }
        }
    }

    /// Fold a partial state into this one.
    ///
    /// A `Power` delta applied to a multi-channel state sets every
    /// channel; channels the state does not have are ignored.
    pub fn merge(&mut self, delta: &SwitchState) {
        match (self, delta) {
            (Self::Power(current), Self::Power(new)) => *current = *new,
            (Self::Toggle(current), Self::Toggle(new)) => {
                for (channel, state) in new {
                    if let Some(slot) = current.get_mut(channel) {
                        *slot = *state;
                    }
                }
            }
            (Self::Toggle(current), Self::Power(new)) => {
                current.values_mut().for_each(|slot| *slot = *new);
            }
            (Self::Power(_), Self::Toggle(_)) => {}
        }
    }
}

fn channel_range(channels: usize) -> impl Iterator<Item = u8> {
    (1..=channels.min(MAX_CHANNELS)).filter_map(|i| u8::try_from(i).ok())
}

// ── Topic set ────────────────────────────────────────────────────────

/// Every topic derived from a discovery payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSet {
    /// Device topic (`t`).
    pub topic: String,
    /// Command prefix, e.g. `cmnd/tasmota_F0E1D2/`.
    pub command: String,
    /// State prefix, e.g. `stat/tasmota_F0E1D2/`.
    pub state_prefix: String,
    /// Telemetry prefix, e.g. `tele/tasmota_F0E1D2/`.
    pub telemetry: String,
    /// LWT topic.
    pub availability: String,
    /// `<command>STATE`; an empty publish asks for a state report.
    pub poll: String,
    /// `<state>RESULT`.
    pub result: String,
    /// `<telemetry>STATE`.
    pub state_topic: String,
    /// `<state>#`.
    pub state_topic_all: String,
    pub fallback: String,
    /// `<state>POWER` or `<state>POWER<i>` per channel.
    pub power_topics: Vec<String>,
}

// ── Devices ──────────────────────────────────────────────────────────

/// Fields shared by every device category.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommon {
    pub name: String,
    pub mac: MacAddress,
    pub model: String,
    pub firmware: String,
    pub online: bool,
    pub topics: TopicSet,
    /// Payload on the LWT topic meaning "online".
    pub online_literal: String,
    pub offline_literal: String,
    /// Hub correlation tags (`{"deviceInfo":{"deviceId":<mac>}, ..}`).
    pub tags: Value,
    /// SetOption flags, keyed by option number.
    pub set_options: BTreeMap<String, i64>,
}

impl DeviceCommon {
    pub fn set_option(&self, key: &str) -> i64 {
        self.set_options.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchDevice {
    pub common: DeviceCommon,
    /// Number of channels, 1..=4.
    pub channels: usize,
    pub power_on: String,
    pub power_off: String,
    pub state: SwitchState,
}

impl SwitchDevice {
    /// Hub capability list for this switch's channel count.
    pub fn capabilities(&self) -> Value {
        if self.channels > 1 {
            Value::Array(
                channel_range(self.channels)
                    .map(|i| {
                        json!({
                            "capability": "toggle",
                            "permission": "readWrite",
                            "name": i.to_string(),
                        })
                    })
                    .collect(),
            )
        } else {
            json!([{ "capability": "power", "permission": "readWrite" }])
        }
    }

    /// Map a device power literal to on/off; `None` for anything else.
    pub fn parse_power(&self, literal: &str) -> Option<PowerState> {
        if literal == self.power_on {
            Some(PowerState::On)
        } else if literal == self.power_off {
            Some(PowerState::Off)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsupportedDevice {
    pub common: DeviceCommon,
}

/// A cached device. Dispatch over categories is an exhaustive match.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceModel {
    Switch(SwitchDevice),
    Unsupported(UnsupportedDevice),
}

impl DeviceModel {
    pub fn common(&self) -> &DeviceCommon {
        match self {
            Self::Switch(d) => &d.common,
            Self::Unsupported(d) => &d.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut DeviceCommon {
        match self {
            Self::Switch(d) => &mut d.common,
            Self::Unsupported(d) => &mut d.common,
        }
    }

    pub fn mac(&self) -> &MacAddress {
        &self.common().mac
    }

    pub fn name(&self) -> &str {
        &self.common().name
    }

    pub fn online(&self) -> bool {
        self.common().online
    }

    pub fn topics(&self) -> &TopicSet {
        &self.common().topics
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Switch(_) => Category::Switch,
            Self::Unsupported(_) => Category::Unsupported,
        }
    }

    /// Channel count; zero for anything that is not a switch.
    pub fn channels(&self) -> usize {
        match self {
            Self::Switch(d) => d.channels,
            Self::Unsupported(_) => 0,
        }
    }

    pub fn as_switch(&self) -> Option<&SwitchDevice> {
        match self {
            Self::Switch(d) => Some(d),
            Self::Unsupported(_) => None,
        }
    }

    /// Topic filters this device listens on.
    pub fn subscriptions(&self) -> Vec<String> {
        let topics = self.topics();
        match self {
            Self::Switch(_) => {
                let mut subs = vec![
                    topics.state_topic.clone(),
                    topics.availability.clone(),
                    topics.state_topic_all.clone(),
                ];
                subs.extend(topics.power_topics.iter().cloned());
                subs
            }
            Self::Unsupported(_) => vec![topics.availability.clone()],
        }
    }

    /// Hub creation payload; unsupported devices are never offered.
    pub fn discovery_endpoint(&self, service_address: String) -> Option<DiscoveryEndpoint> {
        let Self::Switch(switch) = self else {
            return None;
        };
        let common = &switch.common;
        Some(DiscoveryEndpoint {
            third_serial_number: common.mac.to_string(),
            name: common.name.clone(),
            manufacturer: MANUFACTURER.into(),
            model: common.model.clone(),
            firmware_version: common.firmware.clone(),
            display_category: Category::Switch.to_string(),
            capabilities: switch.capabilities(),
            state: switch.state.to_value(),
            tags: common.tags.clone(),
            service_address,
        })
    }

    /// UI/listing view of this device.
    pub fn summary(&self, synced: bool) -> DeviceSummary {
        DeviceSummary {
            name: self.name().to_owned(),
            category: self.category(),
            id: self.mac().clone(),
            online: self.online(),
            synced,
        }
    }
}

/// Correlation tags for a device: `{"deviceInfo":{"deviceId":mac}}`.
pub fn device_tags(mac: &MacAddress) -> Value {
    json!({ DEVICE_INFO_TAG: { "deviceId": mac.as_str() } })
}

/// `{name, category, id, online, synced}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub name: String,
    pub category: Category,
    pub id: MacAddress,
    pub online: bool,
    pub synced: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn initial_state_shapes() {
        assert_eq!(
            SwitchState::initial(1).to_value(),
            json!({ "power": { "powerState": "off" } })
        );
        assert_eq!(
            SwitchState::initial(3).to_value(),
            json!({ "toggle": {
                "1": { "toggleState": "off" },
                "2": { "toggleState": "off" },
                "3": { "toggleState": "off" }
            }})
        );
    }

    #[test]
    fn merge_applies_partial_toggle_delta() {
        let mut state = SwitchState::initial(2);
        state.merge(&SwitchState::Toggle(BTreeMap::from([
            (2, PowerState::On),
            (7, PowerState::On),
        ])));
        assert_eq!(
            state,
            SwitchState::Toggle(BTreeMap::from([(1, PowerState::Off), (2, PowerState::On)]))
        );

        state.merge(&SwitchState::Power(PowerState::On));
        assert_eq!(
            state,
            SwitchState::Toggle(BTreeMap::from([(1, PowerState::On), (2, PowerState::On)]))
        );
    }

    #[test]
    fn category_strings() {
        assert_eq!(Category::Switch.to_string(), "switch");
        assert_eq!(Category::Unsupported.to_string(), "UNKNOWN");
        assert_eq!("switch".parse::<Category>().unwrap(), Category::Switch);
        assert_eq!(serde_json::to_value(Category::Unsupported).unwrap(), json!("UNKNOWN"));
    }

    #[test]
    fn tags_carry_device_id() {
        let tags = device_tags(&MacAddress::new("A4CF12F0E1D2"));
        assert_eq!(tags, json!({ "deviceInfo": { "deviceId": "A4CF12F0E1D2" } }));
    }
}
