//! In-memory collaborators for scheduler tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use plcpoll_core::domain::device::{DeviceDescriptor, RegisterDescriptor};
use plcpoll_core::domain::key::DeviceKey;
use plcpoll_core::domain::measurement::Measurement;
use plcpoll_core::dto::event::{Event, EventKind};
use tokio::time::Instant;

use crate::gateway::{DeviceGateway, GatewayError, select_device};
use crate::service::{EventSink, ReadError, RegisterReader};

/// Descriptor with the given registers, addressed as `10.0.0.<id>`
pub fn descriptor(id: i64, registers: &[i64]) -> DeviceDescriptor {
    DeviceDescriptor {
        id,
        name: format!("plc-{}", id),
        ip_address: format!("10.0.0.{}", id),
        protocol: "modbus".to_string(),
        registers: registers
            .iter()
            .map(|&id| RegisterDescriptor {
                id,
                name: format!("reg-{}", id),
                address: format!("{}", 40000 + id),
                unit: "C".to_string(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// Catalog-backed gateway recording every push
#[derive(Default)]
pub struct FakeGateway {
    devices: Mutex<Vec<DeviceDescriptor>>,
    pushed: Mutex<Vec<Measurement>>,
    rejected: Mutex<Vec<Measurement>>,
    rejecting: Mutex<HashSet<i64>>,
    fetches: AtomicUsize,
}

impl FakeGateway {
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *self.devices.lock().unwrap() = devices;
    }

    /// Pushes for this register id are dropped as if the backend said 500
    pub fn reject_pushes_for(&self, register_id: i64) {
        self.rejecting.lock().unwrap().insert(register_id);
    }

    pub fn pushed(&self) -> Vec<Measurement> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn rejected(&self) -> Vec<Measurement> {
        self.rejected.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceGateway for FakeGateway {
    async fn fetch_descriptor(&self, key: &DeviceKey) -> Result<DeviceDescriptor, GatewayError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let devices = self.devices.lock().unwrap().clone();
        select_device(devices, key)
    }

    async fn push_measurement(&self, measurement: &Measurement) {
        if self.rejecting.lock().unwrap().contains(&measurement.register_id) {
            self.rejected.lock().unwrap().push(measurement.clone());
        } else {
            self.pushed.lock().unwrap().push(measurement.clone());
        }
    }
}

/// Reader returning `register id * 1.5`, with scripted failures
#[derive(Default)]
pub struct ScriptedReader {
    failing: HashSet<i64>,
    hanging: HashSet<i64>,
}

impl ScriptedReader {
    /// Reads of this register fail
    pub fn failing(mut self, register_id: i64) -> Self {
        self.failing.insert(register_id);
        self
    }

    /// Reads of this register never complete
    pub fn hanging(mut self, register_id: i64) -> Self {
        self.hanging.insert(register_id);
        self
    }
}

#[async_trait]
impl RegisterReader for ScriptedReader {
    async fn read(
        &self,
        _device: &DeviceDescriptor,
        register: &RegisterDescriptor,
    ) -> Result<f64, ReadError> {
        if self.hanging.contains(&register.id) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&register.id) {
            return Err(ReadError::Device(format!(
                "register {} unreachable",
                register.id
            )));
        }
        Ok(register.id as f64 * 1.5)
    }
}

/// Sink keeping every event with the (tokio) instant it was emitted
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Instant, Event)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|event| event.event).collect()
    }

    /// Events other than polls, which are timing dependent
    pub fn lifecycle(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|event| event.event != EventKind::Poll)
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().iter().filter(|k| **k == kind).count()
    }

    /// Emission instants of the poll events for `key`
    pub fn polls_for(&self, key: &str) -> Vec<Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| event.event == EventKind::Poll && event.key.as_deref() == Some(key))
            .map(|(at, _)| *at)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}
