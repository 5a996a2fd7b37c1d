// ── Runtime bridge configuration ──
//
// These types describe how the bridge reaches the hub and how it drives
// its MQTT session. They never touch disk: the binary builds a
// `BridgeConfig` from the config crate and hands it in.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;

pub use mqtt2cube_api::TlsMode;

/// Default open-API base URL of a hub on the local network.
pub const DEFAULT_HUB_URL: &str = "http://ihost/open-api/v1/rest";
/// App name presented when asking the hub for a token.
pub const DEFAULT_APP_NAME: &str = "mqtt2cube-tasmota";
/// Base of the per-device `service_address` advertised on creation.
pub const DEFAULT_SERVICE_ADDRESS: &str = "http://ihost:8325";

/// MQTT broker credentials, as persisted under `mqtt_setting`.
#[derive(Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl MqttSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Username and password are only sent when both are present.
    pub fn credentials(&self) -> Option<(&str, &SecretString)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.as_str(), pass)),
            _ => None,
        }
    }
}

impl fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Timing knobs of the MQTT session.
#[derive(Debug, Clone)]
pub struct MqttTuning {
    pub keepalive: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// How long a self-published topic stays in the echo-suppression set.
    pub echo_ttl: Duration,
}

impl Default for MqttTuning {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(60),
            reconnect_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(30),
            echo_ttl: Duration::from_secs(5),
        }
    }
}

impl MqttTuning {
    /// Short keepalive for local development brokers.
    pub fn dev() -> Self {
        Self {
            keepalive: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

/// Everything the bridge needs besides the persisted settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Hub open-API base URL.
    pub hub_url: String,
    pub app_name: String,
    pub service_address: String,
    pub hub_timeout: Duration,
    pub hub_tls: TlsMode,
    pub mqtt: MqttTuning,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.into(),
            app_name: DEFAULT_APP_NAME.into(),
            service_address: DEFAULT_SERVICE_ADDRESS.into(),
            hub_timeout: Duration::from_secs(60),
            hub_tls: TlsMode::DangerAcceptInvalid,
            mqtt: MqttTuning::default(),
        }
    }
}

impl BridgeConfig {
    /// `service_address` sent to the hub for one device.
    pub fn device_service_address(&self, mac: &str) -> String {
        format!(
            "{}/api/v1/open/device/{mac}",
            self.service_address.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_address_is_per_device() {
        let cfg = BridgeConfig::default();
        assert_eq!(
            cfg.device_service_address("A4CF12F0E1D2"),
            "http://ihost:8325/api/v1/open/device/A4CF12F0E1D2"
        );
    }

    #[test]
    fn credentials_require_both_halves() {
        let mut settings = MqttSettings::new("broker", 1883);
        assert!(settings.credentials().is_none());
        settings.username = Some("user".into());
        assert!(settings.credentials().is_none());
        settings.password = Some(SecretString::from("pw".to_owned()));
        assert_eq!(settings.credentials().map(|(u, _)| u), Some("user"));
    }

    #[test]
    fn debug_redacts_password() {
        let mut settings = MqttSettings::new("broker", 1883);
        settings.password = Some(SecretString::from("hunter2".to_owned()));
        let out = format!("{settings:?}");
        assert!(!out.contains("hunter2"));
    }
}
