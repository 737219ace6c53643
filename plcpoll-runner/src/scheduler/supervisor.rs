//! Poll task supervisor
//!
//! Keeps the registry of live poll tasks, one per key, and drives their
//! lifecycle. The registry mutex only guards handle swaps; descriptor
//! resolution and task teardown happen outside of it.
//!
//! The registry is keyed by the canonical form of each key, so spellings of
//! the same device (`"10.0.0.5"`, `"10.0.0.5|0"`) share one task. Events
//! carry the key as the command spelled it.
//!
//! Operations on the same key are linearized through a per-key async lock,
//! so a replacement task never starts while its predecessor is stopping.
//! Operations on different keys run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use plcpoll_core::domain::device::DeviceDescriptor;
use plcpoll_core::domain::key::{DeviceKey, KeyError};
use plcpoll_core::dto::event::Event;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::task::{PollTask, TaskContext, TaskError, TaskUpdate};

/// Errors reported by supervisor operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("empty key")]
    EmptyKey,

    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("poller is shutting down")]
    ShutDown,

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Owner of every poll task
pub struct Supervisor {
    tasks: Mutex<HashMap<String, PollTask>>,
    key_locks: KeyLocks,
    context: TaskContext,
    default_interval: Duration,
    closed: AtomicBool,
    shutdown_lock: tokio::sync::Mutex<()>,
}

impl Supervisor {
    /// Creates a supervisor handing `context` to every task it spawns
    ///
    /// `default_interval` applies when neither the command nor the device
    /// suggests a cadence.
    pub fn new(context: TaskContext, default_interval: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            key_locks: KeyLocks::default(),
            context,
            default_interval,
            closed: AtomicBool::new(false),
            shutdown_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Starts polling `key`, replacing any task already polling it
    ///
    /// A device that cannot be resolved is polled with an empty descriptor
    /// until an update supplies one.
    pub async fn add(&self, key: &str, interval: Option<Duration>) -> Result<(), SupervisorError> {
        let (key, device_key) = parse_key(key)?;
        let slot = device_key.canonical();
        let _guard = self.key_locks.lock(&slot).await;

        let descriptor = self.resolve(&device_key).await.unwrap_or_default();
        self.install(&slot, key, interval, descriptor).await
    }

    /// Changes the cadence and descriptor of the task polling `key`
    ///
    /// The running task is updated in place. Without a running task this is
    /// the same as [`Supervisor::add`].
    pub async fn update(
        &self,
        key: &str,
        interval: Option<Duration>,
    ) -> Result<(), SupervisorError> {
        let (key, device_key) = parse_key(key)?;
        let slot = device_key.canonical();
        let _guard = self.key_locks.lock(&slot).await;

        let descriptor = self.resolve(&device_key).await;
        let existing = self.tasks().get(&slot).cloned();

        match existing {
            Some(task) if !task.is_stopped() => {
                let update = match descriptor {
                    Some(descriptor) => TaskUpdate {
                        interval: Some(self.effective_interval(interval, &descriptor)),
                        descriptor: Some(descriptor),
                    },
                    None => TaskUpdate {
                        interval,
                        descriptor: None,
                    },
                };

                task.update(update).await?;
                info!("Updated poll task {}", key);
                self.context.sink.emit(Event::updated(key));
                Ok(())
            }
            _ => {
                let descriptor = descriptor.unwrap_or_default();
                self.install(&slot, key, interval, descriptor).await
            }
        }
    }

    /// Stops polling `key` and waits for its task to exit
    ///
    /// Reports `removed` even when no task was polling the key.
    pub async fn remove(&self, key: &str) -> Result<(), SupervisorError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SupervisorError::EmptyKey);
        }

        let slot = slot_of(key);
        let guard = self.key_locks.lock(&slot).await;

        let task = self.tasks().remove(&slot);
        match task {
            Some(task) => {
                task.stop().await;
                info!("Removed poll task {}", key);
            }
            None => debug!("No poll task for {}, nothing to stop", key),
        }

        self.context.sink.emit(Event::removed(key));

        drop(guard);
        self.key_locks.prune(&slot);
        Ok(())
    }

    /// Stops every task and reports `shutdown`
    ///
    /// Only the first call stops tasks and reports. Later calls wait until
    /// that first call has finished, then return.
    pub async fn shutdown(&self) {
        let _serial = self.shutdown_lock.lock().await;

        let drained: Vec<PollTask> = {
            let mut tasks = self.tasks();
            if self.closed.swap(true, Ordering::SeqCst) {
                debug!("Shutdown already done");
                return;
            }
            tasks.drain().map(|(_, task)| task).collect()
        };

        info!("Shutting down, stopping {} poll task(s)", drained.len());
        join_all(drained.iter().map(|task| {
            debug!("Stopping poll task {}", task.key());
            task.stop()
        }))
        .await;

        self.context.sink.emit(Event::shutdown());
        info!("All poll tasks stopped");
    }

    /// Keys with a live task, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tasks().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    #[cfg(test)]
    fn task(&self, key: &str) -> Option<PollTask> {
        self.tasks().get(&slot_of(key)).cloned()
    }

    /// Stops the task in `slot`, if any, and spawns its replacement
    ///
    /// Callers hold the lock of `slot`.
    async fn install(
        &self,
        slot: &str,
        key: &str,
        interval: Option<Duration>,
        descriptor: DeviceDescriptor,
    ) -> Result<(), SupervisorError> {
        let interval = self.effective_interval(interval, &descriptor);

        let previous = self.tasks().remove(slot);
        if let Some(previous) = previous {
            debug!("Replacing poll task {} with {}", previous.key(), key);
            previous.stop().await;
        }

        {
            let mut tasks = self.tasks();
            if self.closed.load(Ordering::SeqCst) {
                return Err(SupervisorError::ShutDown);
            }
            let task = PollTask::spawn(key, interval, descriptor, self.context.clone());
            tasks.insert(slot.to_string(), task);
        }

        info!("Added poll task {} (interval: {:?})", key, interval);
        self.context.sink.emit(Event::added(key));
        Ok(())
    }

    async fn resolve(&self, key: &DeviceKey) -> Option<DeviceDescriptor> {
        match self.context.gateway.fetch_descriptor(key).await {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("Could not resolve device {}: {}", key, e);
                None
            }
        }
    }

    /// Command value, then the device's own interval, then the default
    fn effective_interval(
        &self,
        requested: Option<Duration>,
        descriptor: &DeviceDescriptor,
    ) -> Duration {
        requested
            .filter(|interval| !interval.is_zero())
            .or_else(|| descriptor.suggested_interval())
            .unwrap_or(self.default_interval)
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, PollTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn parse_key(key: &str) -> Result<(&str, DeviceKey), SupervisorError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SupervisorError::EmptyKey);
    }

    let device_key = key.parse()?;
    Ok((key, device_key))
}

/// Registry slot of a raw key
///
/// Keys that do not parse cannot own a task; they map to themselves.
fn slot_of(key: &str) -> String {
    let key = key.trim();
    key.parse::<DeviceKey>()
        .map(|device_key| device_key.canonical())
        .unwrap_or_else(|_| key.to_string())
}

/// Per-key async locks
///
/// Entries nobody holds or waits on are pruned when their key is removed.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();

        lock.lock_owned().await
    }

    fn prune(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
