// ── Device cache ──

mod collection;
pub mod registry;

pub use registry::DeviceRegistry;
