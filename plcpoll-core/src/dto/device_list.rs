//! Device list responses
//!
//! The backend answers the device listing either with a bare JSON array or
//! with an object wrapping the array under `items` or `data`.

use serde::{Deserialize, Serialize};

use crate::domain::device::DeviceDescriptor;

/// Accepted response shapes, tried in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceListResponse {
    List(Vec<DeviceDescriptor>),
    Wrapped(DeviceListWrapper),
}

/// Object form of the device list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceListWrapper {
    #[serde(default)]
    pub items: Option<Vec<DeviceDescriptor>>,
    #[serde(default)]
    pub data: Option<Vec<DeviceDescriptor>>,
}

impl DeviceListResponse {
    /// Extracts the devices
    ///
    /// For the wrapped form `items` wins when it is non-empty, otherwise
    /// `data` is used.
    pub fn into_devices(self) -> Vec<DeviceDescriptor> {
        match self {
            DeviceListResponse::List(devices) => devices,
            DeviceListResponse::Wrapped(wrapper) => match wrapper.items {
                Some(items) if !items.is_empty() => items,
                _ => wrapper.data.unwrap_or_default(),
            },
        }
    }
}
