// ── File-backed settings store ──
//
// The hub token, broker settings and auto-sync flag in one TOML file.
// Every write replaces the file through a temp file + rename.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mqtt2cube_core::{CoreError, MqttSettings, SettingsStore};

use crate::ConfigError;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hub_token: Option<String>,

    #[serde(default)]
    auto_sync: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mqtt_setting: Option<StoredMqtt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMqtt {
    host: String,
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

impl From<&MqttSettings> for StoredMqtt {
    fn from(s: &MqttSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            username: s.username.clone(),
            password: s.password.as_ref().map(|p| p.expose_secret().to_owned()),
        }
    }
}

impl From<StoredMqtt> for MqttSettings {
    fn from(s: StoredMqtt) -> Self {
        Self {
            host: s.host,
            port: s.port,
            username: s.username,
            password: s.password.map(SecretString::from),
        }
    }
}

/// Settings store persisted to a TOML file.
pub struct FileSettings {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl FileSettings {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<R>(&self, f: impl FnOnce(&StateFile) -> R) -> Result<R, CoreError> {
        let guard = self.state.lock().map_err(|_| poisoned())?;
        Ok(f(&guard))
    }

    /// Apply `f` to a copy, write it out, then commit it in memory.
    fn write(&self, f: impl FnOnce(&mut StateFile)) -> Result<(), CoreError> {
        let mut guard = self.state.lock().map_err(|_| poisoned())?;
        let mut next = guard.clone();
        f(&mut next);
        persist(&self.path, &next).map_err(|e| CoreError::Settings {
            message: e.to_string(),
        })?;
        *guard = next;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

fn poisoned() -> CoreError {
    CoreError::Settings {
        message: "settings lock poisoned".into(),
    }
}

fn persist(path: &Path, state: &StateFile) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, toml::to_string_pretty(state)?)?;
    restrict_to_owner(&tmp)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// The file holds the hub token and broker password.
#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl SettingsStore for FileSettings {
    fn token(&self) -> Result<Option<SecretString>, CoreError> {
        self.read(|s| s.hub_token.clone().map(SecretString::from))
    }

    fn set_token(&self, token: SecretString) -> Result<(), CoreError> {
        self.write(|s| s.hub_token = Some(token.expose_secret().to_owned()))
    }

    fn clear_token(&self) -> Result<(), CoreError> {
        self.write(|s| s.hub_token = None)
    }

    fn auto_sync(&self) -> Result<bool, CoreError> {
        self.read(|s| s.auto_sync)
    }

    fn set_auto_sync(&self, enabled: bool) -> Result<(), CoreError> {
        self.write(|s| s.auto_sync = enabled)
    }

    fn mqtt_settings(&self) -> Result<Option<MqttSettings>, CoreError> {
        self.read(|s| s.mqtt_setting.clone().map(MqttSettings::from))
    }

    fn set_mqtt_settings(&self, settings: &MqttSettings) -> Result<(), CoreError> {
        self.write(|s| s.mqtt_setting = Some(StoredMqtt::from(settings)))
    }
}
