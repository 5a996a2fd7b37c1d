// ── Management operations ──
//
// Device listing, hub sync/unsync and remote control. These run inside
// the bridge's command processor, so they never race the MQTT path.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::error::CoreError;
use crate::hub::find_in;
use crate::model::{
    BridgeEvent, Category, ControlDirective, ControlResponse, DeviceModel, DeviceSummary,
    MacAddress, PowerState, SwitchState,
};

pub struct Operations {
    ctx: Arc<SyncContext>,
}

impl Operations {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    fn require_connected(&self) -> Result<(), CoreError> {
        if self.ctx.mqtt.is_connected() {
            Ok(())
        } else {
            Err(CoreError::MqttDisconnected)
        }
    }

    /// Every cached device. `synced` is read from the hub directory when
    /// a token is stored; hub failures leave every device unsynced.
    pub async fn device_list(&self) -> Result<Vec<DeviceSummary>, CoreError> {
        self.require_connected()?;
        let devices = self.ctx.registry.list();

        let directory = if self.ctx.hub.has_token()? {
            self.ctx.hub.directory().await.unwrap_or_else(|e| {
                warn!(error = %e, "hub directory unavailable, listing devices as unsynced");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let mut summaries: Vec<DeviceSummary> = devices
            .iter()
            .map(|d| d.summary(find_in(&directory, d.mac()).is_some()))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    /// Create one cached device in the hub.
    pub async fn sync_device(&self, mac: &MacAddress) -> Result<(), CoreError> {
        self.require_connected()?;
        let device = self
            .ctx
            .registry
            .get(mac)
            .ok_or_else(|| CoreError::SyncTargetUnknown {
                mac: mac.to_string(),
            })?;
        if device.category() == Category::Unsupported {
            return Err(CoreError::UnsupportedDevice {
                mac: mac.to_string(),
            });
        }

        let directory = self.ctx.hub.directory().await?;
        if find_in(&directory, mac).is_some() {
            debug!(mac = %mac, "device already in hub");
            return Ok(());
        }

        self.ctx.hub.create(&[device.as_ref()]).await?;
        info!(mac = %mac, "device synced to hub");
        self.ctx.emit(BridgeEvent::SyncSuccess {
            success_list: vec![mac.clone()],
        });
        Ok(())
    }

    /// Create every cached switch the hub does not know yet, in one request.
    pub async fn sync_all(&self) -> Result<Vec<MacAddress>, CoreError> {
        self.require_connected()?;
        let devices = self.ctx.registry.list();
        let directory = self.ctx.hub.directory().await?;

        let pending: Vec<&DeviceModel> = devices
            .iter()
            .map(AsRef::as_ref)
            .filter(|d| d.category() != Category::Unsupported)
            .filter(|d| find_in(&directory, d.mac()).is_none())
            .collect();
        if pending.is_empty() {
            debug!("no devices left to sync");
            return Ok(Vec::new());
        }

        self.ctx.hub.create(&pending).await?;
        let synced: Vec<MacAddress> = pending.iter().map(|d| d.mac().clone()).collect();
        info!(count = synced.len(), "devices synced to hub");
        self.ctx.emit(BridgeEvent::SyncSuccess {
            success_list: synced.clone(),
        });
        Ok(synced)
    }

    /// Remove one cached device from the hub.
    pub async fn unsync_device(&self, mac: &MacAddress) -> Result<(), CoreError> {
        self.require_connected()?;
        let directory = self.ctx.hub.directory().await?;

        let device = self
            .ctx
            .registry
            .get(mac)
            .ok_or_else(|| CoreError::UnsyncTargetUnknown {
                mac: mac.to_string(),
            })?;
        let entry = find_in(&directory, mac).ok_or_else(|| CoreError::NotInHub {
            mac: mac.to_string(),
        })?;

        self.ctx.hub.delete(&entry.serial_number, mac).await?;
        self.ctx.emit(BridgeEvent::UnSync(device.summary(false)));
        Ok(())
    }

    /// Apply a hub control directive by publishing to the device's
    /// command topics. Any failure answers `ENDPOINT_UNREACHABLE`.
    pub fn control_device(&self, directive: &ControlDirective) -> ControlResponse {
        let message_id = directive.message_id();
        match self.publish_directive(directive) {
            Ok(()) => ControlResponse::success(message_id),
            Err(e) => {
                warn!(message_id, error = %e, "control directive failed");
                ControlResponse::unreachable(message_id)
            }
        }
    }

    fn publish_directive(&self, directive: &ControlDirective) -> Result<(), CoreError> {
        self.require_connected()?;
        let mac = directive.target().ok_or_else(|| CoreError::InvalidDirective {
            message: "endpoint carries no deviceInfo tag".into(),
        })?;
        let device = self.ctx.registry.get(&mac);
        let switch = device
            .as_deref()
            .and_then(DeviceModel::as_switch)
            .ok_or_else(|| CoreError::InvalidDirective {
                message: format!("{mac} is not a known switch"),
            })?;
        let command = &switch.common.topics.command;

        if switch.channels == 1 {
            let power = directive
                .power_state()
                .ok_or_else(|| CoreError::InvalidDirective {
                    message: "missing power.powerState".into(),
                })?;
            self.ctx.mqtt.publish(&format!("{command}POWER"), power)?;
            return Ok(());
        }

        let mut delta = BTreeMap::new();
        for channel in (1..=switch.channels).filter_map(|c| u8::try_from(c).ok()) {
            let Some(value) = directive
                .toggle_state(channel)
                .or_else(|| directive.power_state())
            else {
                continue;
            };
            self.ctx
                .mqtt
                .publish(&format!("{command}POWER{channel}"), value)?;
            if let Ok(state) = value.parse::<PowerState>() {
                delta.insert(channel, state);
            }
        }

        if !delta.is_empty() {
            let delta = SwitchState::Toggle(delta);
            self.ctx.update_device(&mac, |model| {
                if let DeviceModel::Switch(s) = model {
                    s.state.merge(&delta);
                }
            });
        }
        Ok(())
    }
}
