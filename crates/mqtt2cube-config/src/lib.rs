//! Configuration for the mqtt2cube bridge.
//!
//! Layered TOML + environment loading, platform paths, translation to
//! `mqtt2cube_core::BridgeConfig`, and the file-backed settings store.

mod state;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mqtt2cube_core::config::{
    DEFAULT_APP_NAME, DEFAULT_HUB_URL, DEFAULT_SERVICE_ADDRESS, MqttTuning, TlsMode,
};
use mqtt2cube_core::BridgeConfig;

pub use state::FileSettings;

/// Environment variable prefix; nested keys are split on `__`.
pub const ENV_PREFIX: &str = "MQTT2CUBE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubSection,

    #[serde(default)]
    pub mqtt: MqttSection,

    /// Location of the persistent settings file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HubSection {
    /// Hub open-API base URL.
    pub url: String,
    pub app_name: String,
    /// Base of the per-device `service_address`.
    pub service_address: String,
    pub timeout_secs: u64,
    /// How long `token --wait` keeps asking.
    pub token_wait_secs: u64,
    /// Verify the hub's TLS certificate. Hubs on the LAN are self-signed.
    pub verify_tls: bool,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_HUB_URL.into(),
            app_name: DEFAULT_APP_NAME.into(),
            service_address: DEFAULT_SERVICE_ADDRESS.into(),
            timeout_secs: 60,
            token_wait_secs: 300,
            verify_tls: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttSection {
    pub keepalive_secs: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub echo_ttl_secs: u64,
}

impl Default for MqttSection {
    fn default() -> Self {
        let tuning = MqttTuning::default();
        Self {
            keepalive_secs: tuning.keepalive.as_secs(),
            reconnect_delay_ms: u64::try_from(tuning.reconnect_delay.as_millis()).unwrap_or(1000),
            connect_timeout_secs: tuning.connect_timeout.as_secs(),
            echo_ttl_secs: tuning.echo_ttl.as_secs(),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "mqtt2cube", "mqtt2cube")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("mqtt2cube");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the persistent settings file.
pub fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.toml"),
        |dirs| dirs.data_dir().join("state.toml"),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the config from the canonical path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` (if it exists), then `MQTT2CUBE_*` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

/// Write `cfg` to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Persistent settings location: `state_file` or the platform data dir.
    pub fn state_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_path)
    }

    pub fn token_wait(&self) -> Duration {
        Duration::from_secs(self.hub.token_wait_secs)
    }

    /// Build the runtime bridge config. `dev` shortens the MQTT keepalive.
    pub fn to_bridge_config(&self, dev: bool) -> Result<BridgeConfig, ConfigError> {
        let url: url::Url = self.hub.url.parse().map_err(|_| ConfigError::Validation {
            field: "hub.url".into(),
            reason: format!("invalid URL: {}", self.hub.url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "hub.url".into(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.hub.timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "hub.timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.mqtt.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "mqtt.connect_timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let keepalive = if dev {
            MqttTuning::dev().keepalive
        } else {
            Duration::from_secs(self.mqtt.keepalive_secs)
        };

        Ok(BridgeConfig {
            hub_url: self.hub.url.clone(),
            app_name: self.hub.app_name.clone(),
            service_address: self.hub.service_address.clone(),
            hub_timeout: Duration::from_secs(self.hub.timeout_secs),
            hub_tls: if self.hub.verify_tls {
                TlsMode::System
            } else {
                TlsMode::DangerAcceptInvalid
            },
            mqtt: MqttTuning {
                keepalive,
                reconnect_delay: Duration::from_millis(self.mqtt.reconnect_delay_ms),
                connect_timeout: Duration::from_secs(self.mqtt.connect_timeout_secs),
                echo_ttl: Duration::from_secs(self.mqtt.echo_ttl_secs),
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.hub, HubSection::default());
        assert_eq!(cfg.mqtt.keepalive_secs, 60);
        assert_eq!(cfg.mqtt.reconnect_delay_ms, 1000);
        assert!(cfg.state_file.is_none());
    }

    #[test]
    fn file_overrides_individual_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[hub]\nurl = \"http://10.0.0.5/open-api/v1/rest\"\n\n[mqtt]\necho_ttl_secs = 9\n",
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.hub.url, "http://10.0.0.5/open-api/v1/rest");
        assert_eq!(cfg.hub.app_name, DEFAULT_APP_NAME);
        assert_eq!(cfg.mqtt.echo_ttl_secs, 9);
        assert_eq!(cfg.mqtt.connect_timeout_secs, 30);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.hub.token_wait_secs = 42;
        cfg.state_file = Some(dir.path().join("state.toml"));

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn bridge_config_from_defaults() {
        let bridge = Config::default().to_bridge_config(false).unwrap();
        assert_eq!(bridge.hub_url, DEFAULT_HUB_URL);
        assert_eq!(bridge.hub_timeout, Duration::from_secs(60));
        assert_eq!(bridge.mqtt.keepalive, Duration::from_secs(60));
        assert_eq!(bridge.mqtt.echo_ttl, Duration::from_secs(5));
    }

    #[test]
    fn dev_mode_shortens_keepalive() {
        let bridge = Config::default().to_bridge_config(true).unwrap();
        assert_eq!(bridge.mqtt.keepalive, Duration::from_secs(5));
    }

    #[test]
    fn rejects_bad_hub_url() {
        let mut cfg = Config::default();
        cfg.hub.url = "not a url".into();
        let err = cfg.to_bridge_config(false).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "hub.url"));

        cfg.hub.url = "ftp://ihost/".into();
        assert!(cfg.to_bridge_config(false).is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = Config::default();
        cfg.hub.timeout_secs = 0;
        assert!(cfg.to_bridge_config(false).is_err());
    }

    #[test]
    fn state_path_prefers_explicit_file() {
        let cfg = Config {
            state_file: Some(PathBuf::from("/tmp/x/state.toml")),
            ..Config::default()
        };
        assert_eq!(cfg.state_path(), PathBuf::from("/tmp/x/state.toml"));
    }
}
