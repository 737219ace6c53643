//! Measurement ingestion endpoint

use plcpoll_core::domain::measurement::Measurement;

use crate::BackendClient;
use crate::error::Result;

/// Header carrying the ingestion API key
pub const API_KEY_HEADER: &str = "X-API-KEY";

impl BackendClient {
    /// Push one measurement to the ingestion endpoint
    ///
    /// The request is sent without an API key header when none is
    /// configured; the backend is then expected to reject it.
    pub async fn push_measurement(&self, measurement: &Measurement) -> Result<()> {
        let url = format!("{}/api/v1/internal/poller-data", self.base_url);
        let mut request = self.client.post(&url).json(measurement);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request.send().await?;

        self.handle_empty_response(response).await
    }
}
