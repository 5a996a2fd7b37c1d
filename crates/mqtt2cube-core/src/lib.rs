//! Synchronization engine between Tasmota MQTT devices and an eWeLink
//! CUBE hub.
//!
//! - **[`Bridge`]** owns the lifecycle: [`start()`](Bridge::start)
//!   connects to the stored broker and spawns the processor task that
//!   consumes MQTT traffic and API commands in order.
//!   [`Bridge::oneshot()`](Bridge::oneshot) runs a single command for
//!   CLI use.
//!
//! - **[`DeviceRegistry`]** caches the devices announced over MQTT
//!   discovery. It is rebuilt from scratch on every new MQTT session.
//!
//! - **[`HubGateway`]** wraps the hub client with token handling: an
//!   authentication failure clears the stored token.
//!
//! - **[`SettingsStore`]** is the persistence seam for the hub token,
//!   broker settings and the auto-sync flag.

pub mod bridge;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod context;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod model;
pub mod ops;
pub mod reconciler;
pub mod settings;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use command::{Command, CommandResult};
pub use config::{BridgeConfig, MqttSettings, MqttTuning};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{CoreError, result_code};
pub use hub::HubGateway;
pub use settings::{MemorySettings, SettingsStore};
pub use store::DeviceRegistry;

pub use model::{
    BridgeEvent, Category, ControlDirective, ControlResponse, DeviceModel, DeviceSummary,
    DiscoveryMessage, MacAddress,
};
