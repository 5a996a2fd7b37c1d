// Device directory endpoints
//
// `GET /devices` lists every device registered with the hub;
// `DELETE /devices/{serial}` removes one.

use secrecy::SecretString;
use tracing::debug;

use crate::client::HubClient;
use crate::error::Error;
use crate::models::{DeviceList, HubDevice};

impl HubClient {
    /// List the hub's device directory.
    ///
    /// `GET /devices`
    pub async fn list_devices(&self, token: &SecretString) -> Result<Vec<HubDevice>, Error> {
        let url = self.api_url("devices")?;
        let list: Option<DeviceList> = self.get(url, Some(token)).await?;
        let devices = list.unwrap_or_default().device_list;
        debug!(count = devices.len(), "listed hub devices");
        Ok(devices)
    }

    /// Remove a directory entry by its hub serial number.
    ///
    /// `DELETE /devices/{serial_number}`
    pub async fn delete_device(
        &self,
        serial_number: &str,
        token: &SecretString,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("devices/{serial_number}"))?;
        debug!(serial_number, "deleting hub device");
        let _: Option<serde_json::Value> = self.delete(url, Some(token)).await?;
        Ok(())
    }
}
