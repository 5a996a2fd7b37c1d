// ── Core error types ──
//
// Errors surfaced by the bridge. Hub transport details are folded into
// a handful of bridge-level outcomes; every variant maps onto one of the
// numeric result codes reported to management callers.

use thiserror::Error;

/// Numeric result codes of the management contract.
pub mod result_code {
    pub const SUCCESS: u32 = 0;
    pub const INTERNAL: u32 = 500;
    pub const HUB_UNREACHABLE: u32 = 601;
    pub const HUB_TOKEN_INVALID: u32 = 602;
    pub const MQTT_DISCONNECTED: u32 = 603;
    pub const MQTT_SETTINGS_INVALID: u32 = 1001;
    pub const MQTT_NOT_CONFIGURED: u32 = 1101;
    pub const SYNC_DEVICE_UNKNOWN: u32 = 1301;
    pub const SYNC_DEVICE_UNSUPPORTED: u32 = 1302;
    pub const TOKEN_NOT_ISSUED: u32 = 1701;
    pub const UNSYNC_DEVICE_UNKNOWN: u32 = 1801;
    pub const UNSYNC_NOT_IN_HUB: u32 = 1802;
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── MQTT session ─────────────────────────────────────────────────
    #[error("MQTT broker is not connected")]
    MqttDisconnected,

    #[error("Cannot connect to MQTT broker {host}:{port}: {reason}")]
    MqttConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("MQTT broker settings have not been configured")]
    MqttNotConfigured,

    #[error("An MQTT connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    // ── Hub ──────────────────────────────────────────────────────────
    #[error("Hub is unreachable: {reason}")]
    HubUnreachable { reason: String },

    #[error("Hub token is missing or invalid: {message}")]
    HubAuthRequired { message: String },

    #[error("Hub has not issued a token: {message}")]
    TokenNotIssued { message: String },

    #[error("Hub rejected event parameters: {description}")]
    HubValidation { description: String },

    #[error("Hub rejected the request: {message}")]
    HubRejected { message: String },

    // ── Device operations ────────────────────────────────────────────
    #[error("Device {mac} has not been discovered")]
    SyncTargetUnknown { mac: String },

    #[error("Device {mac} is not a supported category and cannot be synced")]
    UnsupportedDevice { mac: String },

    #[error("Device {mac} has not been discovered")]
    UnsyncTargetUnknown { mac: String },

    #[error("Device {mac} is not in the hub directory")]
    NotInHub { mac: String },

    #[error("Invalid control directive: {message}")]
    InvalidDirective { message: String },

    // ── Settings / configuration ─────────────────────────────────────
    #[error("Settings store error: {message}")]
    Settings { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The management result code for this error.
    pub fn result_code(&self) -> u32 {
        match self {
            Self::MqttDisconnected => result_code::MQTT_DISCONNECTED,
            Self::MqttConnectFailed { .. } => result_code::MQTT_SETTINGS_INVALID,
            Self::MqttNotConfigured => result_code::MQTT_NOT_CONFIGURED,
            Self::HubUnreachable { .. } => result_code::HUB_UNREACHABLE,
            Self::HubAuthRequired { .. } => result_code::HUB_TOKEN_INVALID,
            Self::TokenNotIssued { .. } => result_code::TOKEN_NOT_ISSUED,
            Self::SyncTargetUnknown { .. } => result_code::SYNC_DEVICE_UNKNOWN,
            Self::UnsupportedDevice { .. } => result_code::SYNC_DEVICE_UNSUPPORTED,
            Self::UnsyncTargetUnknown { .. } => result_code::UNSYNC_DEVICE_UNKNOWN,
            Self::NotInHub { .. } => result_code::UNSYNC_NOT_IN_HUB,
            Self::AlreadyConnecting
            | Self::PublishFailed { .. }
            | Self::HubValidation { .. }
            | Self::HubRejected { .. }
            | Self::InvalidDirective { .. }
            | Self::Settings { .. }
            | Self::Config { .. }
            | Self::Internal(_) => result_code::INTERNAL,
        }
    }

    /// Whether the hub token was rejected and must be re-acquired.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::HubAuthRequired { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<mqtt2cube_api::Error> for CoreError {
    fn from(err: mqtt2cube_api::Error) -> Self {
        use mqtt2cube_api::Error as Api;

        if err.is_transient() {
            return CoreError::HubUnreachable {
                reason: err.to_string(),
            };
        }

        match err {
            Api::Authentication { message } => CoreError::HubAuthRequired { message },
            Api::Transport(e) => CoreError::HubRejected {
                message: e.to_string(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid hub URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::HubUnreachable {
                reason: format!("timed out after {timeout_secs}s"),
            },
            Api::Tls(msg) => CoreError::HubUnreachable {
                reason: format!("TLS error: {msg}"),
            },
            Api::Hub { code, message } => CoreError::HubRejected {
                message: format!("error {code}: {message}"),
            },
            Api::InvalidParameters { description } => CoreError::HubValidation { description },
            Api::EventRejected { kind, description } => CoreError::HubRejected {
                message: format!("{kind}: {description}"),
            },
            Api::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
