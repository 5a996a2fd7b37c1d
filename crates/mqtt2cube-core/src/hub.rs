// ── Hub gateway ──
//
// Every hub call made by the bridge goes through here. The gateway reads
// the token from the settings store, clears it as soon as the hub
// rejects it, and translates API errors into `CoreError`.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, info, warn};

use mqtt2cube_api::models::EventEndpoint;
use mqtt2cube_api::{EventResponse, HubClient, HubDevice, TransportConfig};

use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::model::{DeviceModel, MacAddress};
use crate::settings::SettingsStore;

pub struct HubGateway {
    client: HubClient,
    settings: Arc<dyn SettingsStore>,
    config: BridgeConfig,
}

impl HubGateway {
    pub fn new(config: BridgeConfig, settings: Arc<dyn SettingsStore>) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: config.hub_tls,
            timeout: config.hub_timeout,
        };
        let client = HubClient::new(&config.hub_url, &transport)?;
        Ok(Self::with_client(client, config, settings))
    }

    pub fn with_client(
        client: HubClient,
        config: BridgeConfig,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            client,
            settings,
            config,
        }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ── Token ────────────────────────────────────────────────────────

    pub fn has_token(&self) -> Result<bool, CoreError> {
        Ok(self.settings.token()?.is_some())
    }

    fn require_token(&self) -> Result<SecretString, CoreError> {
        self.settings
            .token()?
            .ok_or_else(|| CoreError::HubAuthRequired {
                message: "no hub token stored".into(),
            })
    }

    /// Make sure a token is stored, asking the hub for one if needed.
    ///
    /// The hub answers 400/401 until its access window is opened; that
    /// case is reported as [`CoreError::TokenNotIssued`].
    pub async fn acquire_token(&self) -> Result<(), CoreError> {
        if self.has_token()? {
            debug!("hub token already stored");
            return Ok(());
        }

        match self.client.request_access_token(&self.config.app_name).await {
            Ok(token) => {
                self.settings.set_token(token)?;
                info!("hub token acquired");
                Ok(())
            }
            Err(e) if e.is_auth_expired() => Err(CoreError::TokenNotIssued {
                message: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Convert an API error, dropping the stored token if it was refused.
    fn fail(&self, err: mqtt2cube_api::Error) -> CoreError {
        if err.is_auth_expired() {
            warn!(error = %err, "hub rejected token, clearing it");
            if let Err(e) = self.settings.clear_token() {
                warn!(error = %e, "failed to clear hub token");
            }
        }
        err.into()
    }

    // ── Directory ────────────────────────────────────────────────────

    /// The hub's device directory.
    pub async fn directory(&self) -> Result<Vec<HubDevice>, CoreError> {
        let token = self.require_token()?;
        self.client
            .list_devices(&token)
            .await
            .map_err(|e| self.fail(e))
    }

    /// The directory entry correlated with `mac`, if any.
    pub async fn find(&self, mac: &MacAddress) -> Result<Option<HubDevice>, CoreError> {
        Ok(find_in(&self.directory().await?, mac).cloned())
    }

    /// Offer `models` to the hub for creation.
    ///
    /// Unsupported devices are skipped. Succeeds only when the hub
    /// answers with a non-error response.
    pub async fn create(&self, models: &[&DeviceModel]) -> Result<EventResponse, CoreError> {
        let token = self.require_token()?;
        let endpoints: Vec<_> = models
            .iter()
            .filter_map(|m| {
                m.discovery_endpoint(self.config.device_service_address(m.mac().as_str()))
            })
            .collect();

        let resp = self
            .client
            .discover_devices(endpoints, &token)
            .await
            .map_err(|e| self.fail(e))?;
        info!(count = models.len(), "devices created in hub");
        Ok(resp)
    }

    /// Delete the directory entry `serial_number` (created for `mac`).
    pub async fn delete(&self, serial_number: &str, mac: &MacAddress) -> Result<(), CoreError> {
        let token = self.require_token()?;
        match self.client.delete_device(serial_number, &token).await {
            Ok(()) => {
                info!(mac = %mac, serial_number, "device removed from hub");
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(CoreError::NotInHub {
                mac: mac.to_string(),
            }),
            Err(e) => Err(self.fail(e)),
        }
    }

    // ── Reports ──────────────────────────────────────────────────────

    pub async fn report_online(
        &self,
        hub_device: &HubDevice,
        mac: &MacAddress,
        online: bool,
    ) -> Result<(), CoreError> {
        let token = self.require_token()?;
        self.client
            .report_online(endpoint(hub_device, mac), online, &token)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(())
    }

    pub async fn report_state(
        &self,
        hub_device: &HubDevice,
        mac: &MacAddress,
        state: Value,
    ) -> Result<(), CoreError> {
        let token = self.require_token()?;
        self.client
            .report_state(endpoint(hub_device, mac), state, &token)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(())
    }
}

/// First directory entry correlated with `mac`.
pub fn find_in<'a>(directory: &'a [HubDevice], mac: &MacAddress) -> Option<&'a HubDevice> {
    directory.iter().find(|d| d.matches_mac(mac.as_str()))
}

fn endpoint(hub_device: &HubDevice, mac: &MacAddress) -> EventEndpoint {
    EventEndpoint {
        serial_number: hub_device.serial_number.clone(),
        third_serial_number: mac.to_string(),
    }
}
