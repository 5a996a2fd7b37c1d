// ── Discovery processing ──
//
// Turns a discovery payload into a device model and folds it into the
// cache. Hub-side edits (auto-sync, delete on category loss, recreate on
// channel-count change) are best-effort: whatever the hub answers, the
// new model is cached and its topics subscribed.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::codec::{channel_count, classify, derive_topics};
use crate::context::SyncContext;
use crate::model::device::device_tags;
use crate::model::{
    BridgeEvent, Category, DeviceCommon, DeviceModel, DiscoveryMessage, MacAddress, SwitchDevice,
    SwitchState, UnsupportedDevice,
};

/// Build the model announced by `msg`. Devices always start offline.
pub fn build_device(msg: &DiscoveryMessage) -> DeviceModel {
    let mac = MacAddress::new(&msg.mac);
    let channels = channel_count(&msg.rl).max(1);

    let mut common = DeviceCommon {
        name: msg.dn.clone(),
        model: msg.md.clone(),
        firmware: msg.sw.clone(),
        online: false,
        topics: derive_topics(msg, channels),
        online_literal: msg.onln.clone(),
        offline_literal: msg.ofln.clone(),
        tags: device_tags(&mac),
        set_options: msg.so.clone(),
        mac,
    };

    match classify(&msg.rl) {
        Category::Switch => {
            if channels > 1 {
                let names: Map<String, Value> = (1..=channels)
                    .map(|i| {
                        let name = msg
                            .friendly_name(i - 1)
                            .map_or_else(|| format!("{} switch {i}", msg.dn), str::to_owned);
                        (i.to_string(), Value::String(name))
                    })
                    .collect();
                if let Some(tags) = common.tags.as_object_mut() {
                    tags.insert("toggle".into(), Value::Object(names));
                }
            }
            DeviceModel::Switch(SwitchDevice {
                common,
                channels,
                power_on: msg.power_literal(1).to_owned(),
                power_off: msg.power_literal(0).to_owned(),
                state: SwitchState::initial(channels),
            })
        }
        Category::Unsupported => DeviceModel::Unsupported(UnsupportedDevice { common }),
    }
}

pub struct DiscoveryProcessor {
    ctx: Arc<SyncContext>,
}

impl DiscoveryProcessor {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Fold one discovery payload into the cache.
    pub async fn process(&self, msg: &DiscoveryMessage) {
        let model = build_device(msg);
        let mac = model.mac().clone();

        match self.ctx.registry.get(&mac) {
            None => self.add(model).await,
            Some(previous) => self.update(&previous, model).await,
        }

        if let Some(switch) = self.ctx.registry.get(&mac).as_deref().and_then(DeviceModel::as_switch)
        {
            let poll = &switch.common.topics.poll;
            if let Err(e) = self.ctx.mqtt.publish(poll, "") {
                warn!(mac = %mac, topic = %poll, error = %e, "state poll failed");
            }
        }
    }

    async fn add(&self, model: DeviceModel) {
        let mac = model.mac().clone();
        info!(mac = %mac, name = model.name(), category = %model.category(), "device discovered");

        self.ctx.registry.replace(model.clone());
        self.subscribe(&model);

        let synced = self.auto_sync(&model).await;
        self.ctx.emit(BridgeEvent::NewDevice(model.summary(synced)));
    }

    async fn auto_sync(&self, model: &DeviceModel) -> bool {
        if model.category() == Category::Unsupported {
            return false;
        }
        match self.ctx.hub.settings().auto_sync() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(error = %e, "cannot read auto-sync flag");
                return false;
            }
        }

        match self.ctx.hub.create(&[model]).await {
            Ok(_) => {
                info!(mac = %model.mac(), "device auto-synced to hub");
                true
            }
            Err(e) => {
                warn!(mac = %model.mac(), error = %e, "auto-sync failed");
                false
            }
        }
    }

    async fn update(&self, previous: &DeviceModel, model: DeviceModel) {
        let mac = model.mac().clone();
        debug!(mac = %mac, "device rediscovered");

        self.reconcile_directory(previous, &model).await;

        if previous.name() != model.name() {
            info!(mac = %mac, from = previous.name(), to = model.name(), "device renamed");
            self.ctx.emit(BridgeEvent::NameChanged {
                device_id: mac.clone(),
                name: model.name().to_owned(),
            });
        }

        for topic in previous.subscriptions() {
            if let Err(e) = self.ctx.mqtt.unsubscribe(&topic) {
                warn!(mac = %mac, topic = %topic, error = %e, "unsubscribe failed");
            }
        }
        self.subscribe(&model);
        self.ctx.registry.replace(model);
    }

    /// Apply a shape change to the hub entry of an already known device.
    async fn reconcile_directory(&self, previous: &DeviceModel, model: &DeviceModel) {
        let category_changed = previous.category() != model.category();
        let channels_changed = !category_changed
            && model.category() == Category::Switch
            && previous.channels() != model.channels();
        if !category_changed && !channels_changed {
            return;
        }

        let mac = model.mac();
        let entry = match self.ctx.hub.find(mac).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return,
            Err(e) => {
                warn!(mac = %mac, error = %e, "hub lookup failed, keeping local model only");
                return;
            }
        };

        match (category_changed, model) {
            (true, DeviceModel::Unsupported(_)) => {
                info!(mac = %mac, "device became unsupported, removing it from hub");
                if let Err(e) = self.ctx.hub.delete(&entry.serial_number, mac).await {
                    warn!(mac = %mac, error = %e, "hub delete failed");
                }
            }
            (true, DeviceModel::Switch(_)) => {
                debug!(mac = %mac, "category change accepted without hub edit");
            }
            (false, _) => {
                info!(
                    mac = %mac,
                    from = previous.channels(),
                    to = model.channels(),
                    "channel count changed, recreating hub device"
                );
                if let Err(e) = self.ctx.hub.delete(&entry.serial_number, mac).await {
                    warn!(mac = %mac, error = %e, "hub delete failed");
                    return;
                }
                if let Err(e) = self.ctx.hub.create(&[model]).await {
                    warn!(mac = %mac, error = %e, "hub recreate failed");
                }
            }
        }
    }

    fn subscribe(&self, model: &DeviceModel) {
        for topic in model.subscriptions() {
            if let Err(e) = self.ctx.mqtt.subscribe(&topic) {
                warn!(mac = %model.mac(), topic = %topic, error = %e, "subscribe failed");
            }
        }
    }
}
