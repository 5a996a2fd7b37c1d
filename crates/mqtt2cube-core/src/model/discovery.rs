// ── Discovery payload ──
//
// Decoded `tasmota/discovery/<MAC>/config` message. Field names follow
// the firmware's abbreviated keys; everything is defaulted because
// older firmware omits keys freely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Relay type code for a plain on/off relay.
pub const RELAY_SWITCH: u8 = 1;

/// Raw discovery payload published by a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryMessage {
    /// IP address.
    pub ip: String,
    /// Device name.
    pub dn: String,
    /// Friendly names, one per relay; `null` entries are unnamed.
    #[serde(rename = "fn")]
    pub friendly_names: Vec<Option<String>>,
    /// Hostname.
    pub hn: String,
    pub mac: String,
    /// Hardware model.
    pub md: String,
    /// Offline literal on the LWT topic.
    pub ofln: String,
    /// Online literal on the LWT topic.
    pub onln: String,
    /// Power literals: `[off, on, toggle, hold]`.
    pub state: Vec<String>,
    /// Firmware version.
    pub sw: String,
    /// Device topic.
    pub t: String,
    /// Full topic template with `%prefix%`, `%topic%`, `%hostname%`, `%id%`.
    pub ft: String,
    /// Topic-group prefixes: `[command, state, telemetry]`.
    pub tp: Vec<String>,
    /// Relay types: 0 none, 1 relay, 2 light, 3 shutter.
    pub rl: Vec<u8>,
    /// SetOption values that affect message formatting, keyed by option number.
    pub so: BTreeMap<String, i64>,
    pub swc: Vec<i64>,
    pub swn: Vec<Option<String>>,
    pub btn: Vec<i64>,
    pub lk: i64,
    pub lt_st: i64,
    pub sho: Vec<i64>,
    pub sht: Vec<Vec<i64>>,
    pub ver: i64,
    pub ty: i64,
    #[serde(rename = "if")]
    pub ifan: i64,
}

impl DiscoveryMessage {
    /// Parse a discovery payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Friendly name of channel `index` (0-based), if the device set one.
    pub fn friendly_name(&self, index: usize) -> Option<&str> {
        self.friendly_names
            .get(index)
            .and_then(Option::as_deref)
            .filter(|name| !name.is_empty())
    }

    /// Topic-group prefix `index` (0 command, 1 state, 2 telemetry).
    pub fn prefix(&self, index: usize) -> &str {
        self.tp.get(index).map_or("", String::as_str)
    }

    /// Power literal `index` (0 off, 1 on).
    pub fn power_literal(&self, index: usize) -> &str {
        self.state.get(index).map_or("", String::as_str)
    }
}

/// Whether `topic` is a discovery config topic (`tasmota/discovery/<id>/config`).
pub fn is_discovery_topic(topic: &str) -> bool {
    let parts: Vec<&str> = topic.split('/').collect();
    matches!(parts.as_slice(), ["tasmota", "discovery", _, "config", ..])
}
