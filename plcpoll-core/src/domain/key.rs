//! Device keys
//!
//! A key addresses one managed device as `"<address>[|<vlan>]"`. The address
//! compares case-insensitively; a vlan of `0`, an empty suffix and no suffix
//! all mean "no vlan".

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::device::DeviceDescriptor;

/// Separator between the address and the vlan in a key
pub const VLAN_SEPARATOR: char = '|';

/// Errors produced while parsing a key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("empty key")]
    Empty,

    #[error("invalid vlan in key {key}")]
    InvalidVlan { key: String },
}

/// Parsed form of a device key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    address: String,
    vlan: Option<i64>,
}

impl DeviceKey {
    /// Creates a key from an address and an optional vlan
    ///
    /// A vlan of `Some(0)` is normalized to `None`.
    pub fn new(address: impl Into<String>, vlan: Option<i64>) -> Self {
        Self {
            address: address.into(),
            vlan: vlan.filter(|v| *v != 0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn vlan(&self) -> Option<i64> {
        self.vlan
    }

    /// Returns true if the descriptor is the device this key addresses
    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        if !device.ip_address.eq_ignore_ascii_case(&self.address) {
            return false;
        }

        let device_vlan = device.vlan_id.filter(|v| *v != 0);
        device_vlan == self.vlan
    }

    /// Form shared by every spelling of the same device
    ///
    /// `"PLC-1"`, `"plc-1|0"` and `"plc-1|"` all give `"plc-1"`.
    pub fn canonical(&self) -> String {
        let address = self.address.to_ascii_lowercase();
        match self.vlan {
            Some(vlan) => format!("{}{}{}", address, VLAN_SEPARATOR, vlan),
            None => address,
        }
    }
}

impl FromStr for DeviceKey {
    type Err = KeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let key = key.trim();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }

        let (address, vlan_raw) = match key.split_once(VLAN_SEPARATOR) {
            Some((address, vlan)) => (address.trim(), vlan.trim()),
            None => (key, ""),
        };

        if vlan_raw.is_empty() {
            return Ok(Self::new(address, None));
        }

        let vlan = vlan_raw.parse::<i64>().map_err(|_| KeyError::InvalidVlan {
            key: key.to_string(),
        })?;

        Ok(Self::new(address, Some(vlan)))
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vlan {
            Some(vlan) => write!(f, "{}{}{}", self.address, VLAN_SEPARATOR, vlan),
            None => f.write_str(&self.address),
        }
    }
}
