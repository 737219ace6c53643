//! Device catalog endpoints

use plcpoll_core::domain::device::DeviceDescriptor;
use plcpoll_core::dto::device_list::DeviceListResponse;
use reqwest::header::ACCEPT;

use crate::BackendClient;
use crate::error::{ClientError, Result};

impl BackendClient {
    /// List every device known to the backend
    ///
    /// Accepts both the bare-list and the wrapped response shapes.
    pub async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let url = format!("{}/api/v1/plcs", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let body = self.handle_bytes(response).await?;
        decode_device_list(&body)
    }
}

pub(crate) fn decode_device_list(body: &[u8]) -> Result<Vec<DeviceDescriptor>> {
    serde_json::from_slice::<DeviceListResponse>(body)
        .map(DeviceListResponse::into_devices)
        .map_err(|e| ClientError::ParseError(e.to_string()))
}
