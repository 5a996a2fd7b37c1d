// ── Shared sync context ──
//
// The collaborators every sync path needs: the device cache, the hub
// gateway, the outbound MQTT link and the UI event sink.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use mqtt2cube_api::HubDevice;

use crate::connection::MqttLink;
use crate::hub::{HubGateway, find_in};
use crate::model::{BridgeEvent, DeviceModel, MacAddress};
use crate::store::DeviceRegistry;

pub struct SyncContext {
    pub registry: Arc<DeviceRegistry>,
    pub hub: Arc<HubGateway>,
    pub mqtt: Arc<dyn MqttLink>,
    pub events: broadcast::Sender<BridgeEvent>,
}

impl SyncContext {
    pub(crate) fn emit(&self, event: BridgeEvent) {
        debug!(event = event.name(), "emitting UI event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Directory entry for `mac`, for best-effort pushes.
    ///
    /// `None` when no token is stored or the hub cannot be asked; the
    /// failure is logged and the push skipped.
    pub(crate) async fn directory_entry(&self, mac: &MacAddress) -> Option<HubDevice> {
        if !self.hub.has_token().unwrap_or(false) {
            debug!(mac = %mac, "no hub token, skipping hub push");
            return None;
        }
        match self.hub.find(mac).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(mac = %mac, error = %e, "hub directory lookup failed");
                None
            }
        }
    }

    /// Cached devices paired with their directory entries.
    ///
    /// Empty when no token is stored or the directory cannot be read.
    pub(crate) async fn directory_matches(
        &self,
        devices: &[Arc<DeviceModel>],
    ) -> Vec<(Arc<DeviceModel>, HubDevice)> {
        if devices.is_empty() || !self.hub.has_token().unwrap_or(false) {
            return Vec::new();
        }
        let directory = match self.hub.directory().await {
            Ok(directory) => directory,
            Err(e) => {
                warn!(error = %e, "hub directory lookup failed");
                return Vec::new();
            }
        };
        devices
            .iter()
            .filter_map(|d| find_in(&directory, d.mac()).map(|e| (Arc::clone(d), e.clone())))
            .collect()
    }

    /// Replace the cached model for `mac` with `f` applied to a copy.
    /// Returns the updated model, or `None` if the device is not cached.
    pub(crate) fn update_device(
        &self,
        mac: &MacAddress,
        f: impl FnOnce(&mut DeviceModel),
    ) -> Option<DeviceModel> {
        let mut model = self.registry.get(mac)?.as_ref().clone();
        f(&mut model);
        self.registry.replace(model.clone());
        Some(model)
    }

    /// Report the online flag of every directory-matched device in
    /// `devices`; `force_offline` reports `false` regardless of the cache.
    pub(crate) async fn repair_online(&self, devices: &[Arc<DeviceModel>], force_offline: bool) {
        for (device, entry) in self.directory_matches(devices).await {
            let online = !force_offline && device.online();
            if let Err(e) = self.hub.report_online(&entry, device.mac(), online).await {
                warn!(mac = %device.mac(), error = %e, "online repair push failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use wiremock::MockServer;

    use crate::error::CoreError;
    use crate::hub::tests::gateway;
    use crate::settings::MemorySettings;

    /// MQTT link that records what it was asked to do.
    #[derive(Default)]
    pub(crate) struct RecordingLink {
        pub disconnected: bool,
        pub subscribed: Mutex<Vec<String>>,
        pub unsubscribed: Mutex<Vec<String>>,
        pub published: Mutex<Vec<(String, String)>>,
    }

    impl RecordingLink {
        pub(crate) fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }

        pub(crate) fn subscribed(&self) -> Vec<String> {
            self.subscribed.lock().unwrap().clone()
        }

        pub(crate) fn unsubscribed(&self) -> Vec<String> {
            self.unsubscribed.lock().unwrap().clone()
        }
    }

    impl MqttLink for RecordingLink {
        fn is_connected(&self) -> bool {
            !self.disconnected
        }

        fn subscribe(&self, topic: &str) -> Result<(), CoreError> {
            if !topic.is_empty() {
                self.subscribed.lock().unwrap().push(topic.to_owned());
            }
            Ok(())
        }

        fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
            if !topic.is_empty() {
                self.unsubscribed.lock().unwrap().push(topic.to_owned());
            }
            Ok(())
        }

        fn publish(&self, topic: &str, payload: &str) -> Result<(), CoreError> {
            if self.disconnected {
                return Err(CoreError::MqttDisconnected);
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_owned(), payload.to_owned()));
            Ok(())
        }
    }

    pub(crate) struct Harness {
        pub ctx: Arc<SyncContext>,
        pub link: Arc<RecordingLink>,
        pub settings: Arc<MemorySettings>,
        pub events: broadcast::Receiver<BridgeEvent>,
    }

    impl Harness {
        /// Drain every event emitted so far.
        pub(crate) fn drain_events(&mut self) -> Vec<BridgeEvent> {
            std::iter::from_fn(|| self.events.try_recv().ok()).collect()
        }
    }

    pub(crate) fn harness(server: &MockServer, token: Option<&str>) -> Harness {
        harness_with_link(server, token, RecordingLink::default())
    }

    pub(crate) fn harness_with_link(
        server: &MockServer,
        token: Option<&str>,
        link: RecordingLink,
    ) -> Harness {
        let (hub, settings) = gateway(server, token);
        let link = Arc::new(link);
        let (events, rx) = broadcast::channel(64);
        let mqtt: Arc<dyn MqttLink> = link.clone();
        Harness {
            ctx: Arc::new(SyncContext {
                registry: Arc::new(DeviceRegistry::new()),
                hub: Arc::new(hub),
                mqtt,
                events,
            }),
            link,
            settings,
            events: rx,
        }
    }
}
