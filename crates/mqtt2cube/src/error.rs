//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use mqtt2cube_config::ConfigError;
use mqtt2cube_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── MQTT ─────────────────────────────────────────────────────────
    #[error("MQTT broker has not been configured")]
    #[diagnostic(
        code(mqtt2cube::mqtt_not_configured),
        help("Store a broker with: mqtt2cube mqtt set --host <HOST> --port <PORT>")
    )]
    MqttNotConfigured,

    #[error("Could not connect to MQTT broker {host}:{port}")]
    #[diagnostic(
        code(mqtt2cube::mqtt_connect_failed),
        help("Check the broker address and credentials ({reason}).")
    )]
    MqttConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("MQTT broker is not connected")]
    #[diagnostic(code(mqtt2cube::mqtt_disconnected))]
    MqttDisconnected,

    // ── Hub ──────────────────────────────────────────────────────────
    #[error("Hub is unreachable: {reason}")]
    #[diagnostic(
        code(mqtt2cube::hub_unreachable),
        help("Check hub.url in the config file: mqtt2cube config show")
    )]
    HubUnreachable { reason: String },

    #[error("No valid hub token")]
    #[diagnostic(
        code(mqtt2cube::hub_auth),
        help("Acquire one with: mqtt2cube token --wait")
    )]
    HubAuthRequired,

    #[error("The hub has not issued a token")]
    #[diagnostic(
        code(mqtt2cube::token_not_issued),
        help(
            "Allow access in the hub's web UI, then run: mqtt2cube token --wait\n\
             ({message})"
        )
    )]
    TokenNotIssued { message: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device {mac} has not been discovered")]
    #[diagnostic(
        code(mqtt2cube::device_unknown),
        help("Run: mqtt2cube devices --discover-secs 15")
    )]
    DeviceUnknown { mac: String },

    #[error("Device {mac} is not in the hub")]
    #[diagnostic(code(mqtt2cube::not_in_hub))]
    NotInHub { mac: String },

    #[error("Device {mac} is not a supported switch")]
    #[diagnostic(code(mqtt2cube::unsupported_device))]
    Unsupported { mac: String },

    // ── Generic bridge failure ───────────────────────────────────────
    #[error("Bridge error ({code}): {message}")]
    #[diagnostic(code(mqtt2cube::bridge))]
    Bridge { code: u32, message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(mqtt2cube::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(mqtt2cube::config))]
    Config(#[from] ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MqttConnectFailed { .. } | Self::MqttDisconnected | Self::HubUnreachable { .. } => {
                exit_code::CONNECTION
            }
            Self::HubAuthRequired | Self::TokenNotIssued { .. } => exit_code::AUTH,
            Self::DeviceUnknown { .. } | Self::NotInHub { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::MqttNotConfigured | Self::ConfigExists { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Bridge { .. } | Self::Io(_) | Self::Render(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MqttNotConfigured => CliError::MqttNotConfigured,
            CoreError::MqttConnectFailed { host, port, reason } => {
                CliError::MqttConnectFailed { host, port, reason }
            }
            CoreError::MqttDisconnected => CliError::MqttDisconnected,
            CoreError::HubUnreachable { reason } => CliError::HubUnreachable { reason },
            CoreError::HubAuthRequired { .. } => CliError::HubAuthRequired,
            CoreError::TokenNotIssued { message } => CliError::TokenNotIssued { message },
            CoreError::SyncTargetUnknown { mac } | CoreError::UnsyncTargetUnknown { mac } => {
                CliError::DeviceUnknown { mac }
            }
            CoreError::NotInHub { mac } => CliError::NotInHub { mac },
            CoreError::UnsupportedDevice { mac } => CliError::Unsupported { mac },
            other => CliError::Bridge {
                code: other.result_code(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (CoreError::MqttNotConfigured, exit_code::USAGE),
            (
                CoreError::HubAuthRequired {
                    message: "revoked".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::SyncTargetUnknown { mac: "AA".into() },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::UnsupportedDevice { mac: "AA".into() },
                exit_code::UNSUPPORTED,
            ),
            (CoreError::MqttDisconnected, exit_code::CONNECTION),
            (CoreError::Internal("boom".into()), exit_code::GENERAL),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn generic_failure_keeps_result_code() {
        let err = CliError::from(CoreError::HubValidation {
            description: "bad".into(),
        });
        assert!(matches!(err, CliError::Bridge { code: 500, .. }));
    }
}
