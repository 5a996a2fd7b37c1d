// ── Topic derivation ──
//
// Pure functions turning a discovery payload into the device's topic set
// and channel layout. No I/O and no hidden state: the same payload
// always yields the same result.

use crate::model::discovery::{DiscoveryMessage, RELAY_SWITCH};
use crate::model::{Category, MacAddress, TopicSet};
use crate::model::device::MAX_CHANNELS;

/// Wildcard covering every discovery config topic.
pub const DISCOVERY_WILDCARD: &str = "tasmota/discovery/#";

const PREFIX_COMMAND: usize = 0;
const PREFIX_STATE: usize = 1;
const PREFIX_TELEMETRY: usize = 2;

/// Substitute the full-topic template for topic-group `prefix`.
///
/// Each placeholder is replaced at its first occurrence only.
pub fn fill_template(msg: &DiscoveryMessage, prefix: &str) -> String {
    let mac = MacAddress::new(&msg.mac);
    msg.ft
        .replacen("%hostname%", &msg.hn, 1)
        .replacen("%id%", mac.short_id(), 1)
        .replacen("%prefix%", prefix, 1)
        .replacen("%topic%", &msg.t, 1)
}

/// Count leading switch relays, capped at [`MAX_CHANNELS`].
pub fn channel_count(relays: &[u8]) -> usize {
    relays
        .iter()
        .take(MAX_CHANNELS)
        .take_while(|&&relay| relay == RELAY_SWITCH)
        .count()
}

/// Category from the first relay type.
pub fn classify(relays: &[u8]) -> Category {
    if relays.first() == Some(&RELAY_SWITCH) {
        Category::Switch
    } else {
        Category::Unsupported
    }
}

/// `DVES_<last 6 of MAC>_fb`
pub fn fallback_topic(mac: &MacAddress) -> String {
    format!("DVES_{}_fb", mac.short_id())
}

/// Derive every topic of a device with `channels` channels.
pub fn derive_topics(msg: &DiscoveryMessage, channels: usize) -> TopicSet {
    let command = fill_template(msg, msg.prefix(PREFIX_COMMAND));
    let state_prefix = fill_template(msg, msg.prefix(PREFIX_STATE));
    let telemetry = fill_template(msg, msg.prefix(PREFIX_TELEMETRY));

    let power_topics = if channels > 1 {
        (1..=channels)
            .map(|i| format!("{state_prefix}POWER{i}"))
            .collect()
    } else {
        vec![format!("{state_prefix}POWER")]
    };

    TopicSet {
        topic: msg.t.clone(),
        availability: format!("{telemetry}LWT"),
        poll: format!("{command}STATE"),
        result: format!("{state_prefix}RESULT"),
        state_topic: format!("{telemetry}STATE"),
        state_topic_all: format!("{state_prefix}#"),
        fallback: fallback_topic(&MacAddress::new(&msg.mac)),
        power_topics,
        command,
        state_prefix,
        telemetry,
    }
}
