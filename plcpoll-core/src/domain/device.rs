//! Device domain types

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Metadata describing one polled device and its registers
///
/// An "empty" descriptor (id 0) stands in for a device whose metadata could
/// not be resolved. Polling such a device performs no register reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip_address: String,
    #[serde(default)]
    pub vlan_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub protocol: String,
    /// Suggested polling interval in milliseconds, non-positive when unset
    #[serde(default, deserialize_with = "null_as_default")]
    pub polling_interval: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub registers: Vec<RegisterDescriptor>,
}

impl DeviceDescriptor {
    /// Returns true for the placeholder used when resolution failed
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    /// Returns true if a poll cycle over this device has registers to read
    pub fn is_pollable(&self) -> bool {
        !self.is_empty() && !self.registers.is_empty()
    }

    /// The device's own polling interval, if it suggests one
    pub fn suggested_interval(&self) -> Option<Duration> {
        u64::try_from(self.polling_interval)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// One addressable data point on a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub poll_rate: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub unit: String,
}

impl RegisterDescriptor {
    /// The engineering unit, if the register declares one
    pub fn unit(&self) -> Option<&str> {
        Some(self.unit.as_str()).filter(|u| !u.is_empty())
    }
}

/// Backends send `null` for unset columns; treat it like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
