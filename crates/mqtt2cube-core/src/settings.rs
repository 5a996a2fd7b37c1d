// ── Persistent settings seam ──
//
// The bridge persists three values: the hub token, the MQTT broker
// settings and the auto-sync flag. Storage is pluggable; the config
// crate provides a file-backed store and `MemorySettings` serves tests
// and ephemeral runs.

use std::sync::Mutex;

use secrecy::SecretString;

use crate::config::MqttSettings;
use crate::error::CoreError;

/// Key/value settings used by the bridge.
pub trait SettingsStore: Send + Sync {
    fn token(&self) -> Result<Option<SecretString>, CoreError>;
    fn set_token(&self, token: SecretString) -> Result<(), CoreError>;
    fn clear_token(&self) -> Result<(), CoreError>;

    /// Defaults to `false` when never set.
    fn auto_sync(&self) -> Result<bool, CoreError>;
    fn set_auto_sync(&self, enabled: bool) -> Result<(), CoreError>;

    fn mqtt_settings(&self) -> Result<Option<MqttSettings>, CoreError>;
    fn set_mqtt_settings(&self, settings: &MqttSettings) -> Result<(), CoreError>;
}

#[derive(Default)]
struct MemoryState {
    token: Option<SecretString>,
    auto_sync: bool,
    mqtt: Option<MqttSettings>,
}

/// Volatile settings store.
#[derive(Default)]
pub struct MemorySettings {
    state: Mutex<MemoryState>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> Result<R, CoreError> {
        let mut guard = self.state.lock().map_err(|_| CoreError::Settings {
            message: "settings lock poisoned".into(),
        })?;
        Ok(f(&mut guard))
    }
}

impl SettingsStore for MemorySettings {
    fn token(&self) -> Result<Option<SecretString>, CoreError> {
        self.with(|s| s.token.clone())
    }

    fn set_token(&self, token: SecretString) -> Result<(), CoreError> {
        self.with(|s| s.token = Some(token))
    }

    fn clear_token(&self) -> Result<(), CoreError> {
        self.with(|s| s.token = None)
    }

    fn auto_sync(&self) -> Result<bool, CoreError> {
        self.with(|s| s.auto_sync)
    }

    fn set_auto_sync(&self, enabled: bool) -> Result<(), CoreError> {
        self.with(|s| s.auto_sync = enabled)
    }

    fn mqtt_settings(&self) -> Result<Option<MqttSettings>, CoreError> {
        self.with(|s| s.mqtt.clone())
    }

    fn set_mqtt_settings(&self, settings: &MqttSettings) -> Result<(), CoreError> {
        self.with(|s| s.mqtt = Some(settings.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn token_lifecycle() {
        let store = MemorySettings::new();
        assert!(store.token().unwrap().is_none());

        store.set_token(SecretString::from("t".to_owned())).unwrap();
        assert_eq!(store.token().unwrap().unwrap().expose_secret(), "t");

        store.clear_token().unwrap();
        assert!(store.token().unwrap().is_none());
    }

    #[test]
    fn auto_sync_defaults_off() {
        let store = MemorySettings::new();
        assert!(!store.auto_sync().unwrap());
        store.set_auto_sync(true).unwrap();
        assert!(store.auto_sync().unwrap());
    }

    #[test]
    fn mqtt_settings_round_trip() {
        let store = MemorySettings::new();
        store.set_mqtt_settings(&MqttSettings::new("broker", 1883)).unwrap();
        let got = store.mqtt_settings().unwrap().unwrap();
        assert_eq!(got.host, "broker");
        assert_eq!(got.port, 1883);
    }
}
