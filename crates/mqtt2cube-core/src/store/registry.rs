// ── Device registry ──
//
// In-memory cache of discovered devices keyed by MAC. Nothing here is
// persisted: the registry starts empty, fills from discovery traffic and
// is wiped whenever the MQTT session is lost.
//
// Reads are lock-free and may happen from any task. Mutations are only
// issued by the bridge's event loop, which serializes them.

use std::sync::Arc;

use super::collection::Collection;
use crate::model::{DeviceModel, MacAddress};

pub struct DeviceRegistry {
    devices: Collection<MacAddress, DeviceModel>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Collection::new(),
        }
    }

    pub fn get(&self, mac: &MacAddress) -> Option<Arc<DeviceModel>> {
        self.devices.get(mac)
    }

    /// Every cached device.
    pub fn list(&self) -> Arc<Vec<Arc<DeviceModel>>> {
        self.devices.snapshot()
    }

    /// Insert or replace one device. Returns `true` if it was new.
    pub fn replace(&self, model: DeviceModel) -> bool {
        self.devices.upsert(model.mac().clone(), model)
    }

    /// Replace the whole registry content.
    pub fn replace_all(&self, models: Vec<DeviceModel>) {
        self.devices
            .replace_all(models.into_iter().map(|m| (m.mac().clone(), m)));
    }

    pub fn clear(&self) {
        self.devices.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::discovery::build_device;
    use crate::model::DiscoveryMessage;
    use crate::model::discovery::tests::{dual_relay, single_relay};

    fn device(value: serde_json::Value) -> DeviceModel {
        let msg: DiscoveryMessage = serde_json::from_value(value).unwrap();
        build_device(&msg)
    }

    #[test]
    fn replace_then_get() {
        let reg = DeviceRegistry::new();
        assert!(reg.replace(device(dual_relay())));
        assert!(!reg.replace(device(single_relay())));

        let cached = reg.get(&MacAddress::new("A4CF12F0E1D2")).unwrap();
        assert_eq!(cached.name(), "Kitchen");
        assert_eq!(reg.list().len(), 1);
    }

    #[test]
    fn replace_all_then_clear() {
        let reg = DeviceRegistry::new();
        let mut other = single_relay();
        other["mac"] = serde_json::json!("A4CF12000001");
        reg.replace(device(single_relay()));
        reg.replace_all(vec![device(dual_relay()), device(other)]);
        assert_eq!(reg.list().len(), 2);
        assert_eq!(
            reg.get(&MacAddress::new("A4CF12F0E1D2")).unwrap().name(),
            "Hallway"
        );

        reg.clear();
        assert!(reg.list().is_empty());
        assert!(reg.get(&MacAddress::new("A4CF12F0E1D2")).is_none());
    }
}
