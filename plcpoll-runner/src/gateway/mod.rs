//! Gateway layer
//!
//! The gateway is the runner's view of the backend: resolve a device key to
//! its descriptor, push one measurement. The HTTP implementation wraps
//! [`plcpoll_client::BackendClient`].
//!
//! The trait exists so the scheduler can be tested without a backend.

mod http;

use async_trait::async_trait;
use plcpoll_client::ClientError;
use plcpoll_core::domain::device::DeviceDescriptor;
use plcpoll_core::domain::key::DeviceKey;
use plcpoll_core::domain::measurement::Measurement;
use thiserror::Error;

pub use http::HttpDeviceGateway;

/// Errors produced while resolving a device descriptor
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No device in the catalog matches the key
    #[error("plc {0} not found")]
    NotFound(String),

    /// The catalog could not be fetched
    #[error("failed to fetch device list: {0}")]
    Fetch(#[from] ClientError),
}

/// Repository trait for the backend operations the scheduler needs
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Resolves the descriptor of the device addressed by `key`
    async fn fetch_descriptor(&self, key: &DeviceKey) -> Result<DeviceDescriptor, GatewayError>;

    /// Pushes one measurement
    ///
    /// Best effort: failures are logged by the implementation and never
    /// reported to the caller. No retry is attempted.
    async fn push_measurement(&self, measurement: &Measurement);
}

/// Picks the device addressed by `key` out of a catalog listing
pub fn select_device(
    devices: Vec<DeviceDescriptor>,
    key: &DeviceKey,
) -> Result<DeviceDescriptor, GatewayError> {
    devices
        .into_iter()
        .find(|device| key.matches(device))
        .ok_or_else(|| GatewayError::NotFound(key.to_string()))
}
