// Third-party event endpoints
//
// Everything the bridge pushes to the hub goes through
// `POST /thirdparty/event`: device creation (`DiscoveryRequest`) and the
// online/state change reports for devices already in the directory.

use secrecy::SecretString;
use serde_json::Value;
use tracing::debug;

use crate::client::HubClient;
use crate::error::Error;
use crate::models::{
    DiscoveryEndpoint, DiscoveryPayload, EventEndpoint, EventResponse, OnlinePayload,
    StatePayload, ThirdPartyEvent, event_name,
};

impl HubClient {
    /// Ask the hub to create directory entries for `endpoints`.
    pub async fn discover_devices(
        &self,
        endpoints: Vec<DiscoveryEndpoint>,
        token: &SecretString,
    ) -> Result<EventResponse, Error> {
        debug!(count = endpoints.len(), "sending DiscoveryRequest");
        let event = ThirdPartyEvent::new(
            event_name::DISCOVERY_REQUEST,
            None,
            DiscoveryPayload { endpoints },
        );
        self.post_event(&event, token).await
    }

    /// Report a device's reachability.
    pub async fn report_online(
        &self,
        endpoint: EventEndpoint,
        online: bool,
        token: &SecretString,
    ) -> Result<EventResponse, Error> {
        debug!(serial_number = %endpoint.serial_number, online, "sending DeviceOnlineChangeReport");
        let event = ThirdPartyEvent::new(
            event_name::ONLINE_CHANGE,
            Some(endpoint),
            OnlinePayload { online },
        );
        self.post_event(&event, token).await
    }

    /// Report a partial state change (`{"power": {...}}` or `{"toggle": {...}}`).
    pub async fn report_state(
        &self,
        endpoint: EventEndpoint,
        state: Value,
        token: &SecretString,
    ) -> Result<EventResponse, Error> {
        debug!(serial_number = %endpoint.serial_number, "sending DeviceStatesChangeReport");
        let event = ThirdPartyEvent::new(
            event_name::STATES_CHANGE,
            Some(endpoint),
            StatePayload { state },
        );
        self.post_event(&event, token).await
    }
}
