// ── Domain model ──

pub mod control;
pub mod device;
pub mod discovery;
pub mod event;
pub mod mac;

pub use control::{ControlDirective, ControlResponse};
pub use device::{
    Category, DeviceCommon, DeviceModel, DeviceSummary, PowerState, SwitchDevice, SwitchState,
    TopicSet, UnsupportedDevice,
};
pub use discovery::DiscoveryMessage;
pub use event::BridgeEvent;
pub use mac::MacAddress;
