//! plcpoll HTTP Client
//!
//! A small, type-safe HTTP client for the backend that owns the device
//! catalog and ingests measurements.
//!
//! # Example
//!
//! ```no_run
//! use plcpoll_client::BackendClient;
//!
//! #[tokio::main]
//! async fn main() -> plcpoll_client::Result<()> {
//!     let client = BackendClient::new("http://localhost:5000").with_api_key("secret");
//!
//!     for device in client.list_devices().await? {
//!         println!("{} ({})", device.name, device.ip_address);
//!     }
//!     Ok(())
//! }
//! ```

mod devices;
pub mod error;
mod measurements;

pub use error::{ClientError, Result};
pub use measurements::API_KEY_HEADER;

use reqwest::Client;

/// HTTP client for the backend API
///
/// - Device catalog (list devices)
/// - Measurement ingestion (push one measurement)
#[derive(Debug, Clone)]
pub struct BackendClient {
    /// Base URL of the backend (e.g., "http://localhost:5000")
    base_url: String,
    /// Key sent with ingestion requests
    api_key: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl BackendClient {
    /// Create a new backend client
    ///
    /// # Example
    /// ```
    /// use plcpoll_client::BackendClient;
    ///
    /// let client = BackendClient::new("http://localhost:5000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new backend client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use plcpoll_client::BackendClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(10))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = BackendClient::with_client("http://localhost:5000", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            client,
        }
    }

    /// Set the ingestion API key; blank keys are ignored
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let api_key = api_key.trim();
        self.api_key = (!api_key.is_empty()).then(|| api_key.to_string());
        self
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns true if ingestion requests carry an API key
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and return the raw body
    async fn handle_bytes(&self, response: reqwest::Response) -> Result<Vec<u8>> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                error_text.trim().to_string(),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Handle an API response whose body is not needed
    ///
    /// The body is still drained so the connection can be reused.
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body).trim().to_string();
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        tracing::trace!("backend accepted request ({})", status);
        Ok(())
    }
}
