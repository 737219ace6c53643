//! Register reader service
//!
//! Reads one register from one device. The shipped implementation simulates
//! values; a protocol client (Modbus, S7, OPC UA, ...) plugs in behind the
//! same trait.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use plcpoll_core::domain::device::{DeviceDescriptor, RegisterDescriptor};
use plcpoll_core::domain::measurement::Measurement;
use rand::Rng;
use thiserror::Error;

/// Errors produced by a register read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// Failure reported by a protocol driver
    #[allow(dead_code)]
    #[error("{0}")]
    Device(String),
}

/// Service for reading device registers
#[async_trait]
pub trait RegisterReader: Send + Sync {
    /// Reads the current value of `register` on `device`
    async fn read(
        &self,
        device: &DeviceDescriptor,
        register: &RegisterDescriptor,
    ) -> Result<f64, ReadError>;
}

/// Produces pseudo-random readings in `[0, 100)`
#[derive(Debug, Default, Clone)]
pub struct SimulatedReader;

impl SimulatedReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RegisterReader for SimulatedReader {
    async fn read(
        &self,
        _device: &DeviceDescriptor,
        _register: &RegisterDescriptor,
    ) -> Result<f64, ReadError> {
        let raw: u32 = rand::thread_rng().gen_range(0..100_000);
        Ok(f64::from(raw) / 1000.0)
    }
}

/// Reads one register, bounded by `timeout`, and builds its measurement
///
/// The timestamp is taken before the read starts. Read failures become
/// offline measurements; this function itself never fails.
pub async fn measure(
    reader: &dyn RegisterReader,
    device: &DeviceDescriptor,
    register: &RegisterDescriptor,
    timeout: Duration,
) -> Measurement {
    let timestamp = Utc::now();

    let result = match tokio::time::timeout(timeout, reader.read(device, register)).await {
        Ok(result) => result,
        Err(_) => Err(ReadError::Timeout(timeout)),
    };

    match result {
        Ok(value) => Measurement::online(device.id, register.id, value, register.unit(), timestamp),
        Err(e) => Measurement::offline(device.id, register.id, e.to_string(), timestamp),
    }
}
