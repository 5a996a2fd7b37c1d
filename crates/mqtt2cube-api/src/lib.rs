// mqtt2cube-api: Async Rust client for the eWeLink CUBE / iHost open API

pub mod auth;
pub mod client;
pub mod devices;
pub mod error;
pub mod events;
pub mod models;
pub mod transport;

pub use client::HubClient;
pub use error::Error;
pub use models::{DiscoveryEndpoint, EventEndpoint, EventResponse, HubDevice};
pub use transport::{TlsMode, TransportConfig};
