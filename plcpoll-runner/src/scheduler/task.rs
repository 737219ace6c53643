//! Poll task
//!
//! One independently scheduled poller bound to a key. The task owns its
//! cadence and its device descriptor; the owner keeps a [`PollTask`] handle
//! to update it in place or stop it.
//!
//! Control surfaces:
//! - updates go through a channel holding at most one pending message, so a
//!   second update blocks its caller until the task drains the first
//! - stop and process-wide cancellation are cancellation tokens and win over
//!   a tick that fires at the same time
//! - the task publishes its state on a watch channel, which doubles as the
//!   completion signal `stop()` waits on

use std::sync::Arc;
use std::time::Duration;

use plcpoll_core::domain::device::DeviceDescriptor;
use plcpoll_core::dto::event::Event;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::DeviceGateway;
use crate::service::{EventSink, RegisterReader, measure};

/// Lifecycle of a poll task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Stopped,
}

/// In-place change applied by a running task
///
/// `None`, a zero interval and an empty descriptor all keep the current
/// value.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub interval: Option<Duration>,
    pub descriptor: Option<DeviceDescriptor>,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("poll task {0} has stopped")]
    Stopped(String),
}

/// Collaborators shared by every task
#[derive(Clone)]
pub struct TaskContext {
    pub gateway: Arc<dyn DeviceGateway>,
    pub reader: Arc<dyn RegisterReader>,
    pub sink: Arc<dyn EventSink>,
    /// Bound on one register read
    pub read_timeout: Duration,
    /// Process-wide cancellation
    pub shutdown: CancellationToken,
}

/// Handle to a running poll task
///
/// Cloning the handle does not clone the task. When every handle is dropped
/// the task exits on its own.
#[derive(Clone)]
pub struct PollTask {
    key: String,
    updates: mpsc::Sender<TaskUpdate>,
    stop: CancellationToken,
    state: watch::Receiver<TaskState>,
}

impl PollTask {
    /// Spawns a poll task on the current runtime
    ///
    /// The first poll cycle runs one `interval` after the spawn. A zero
    /// interval is replaced by one second.
    pub fn spawn(
        key: impl Into<String>,
        interval: Duration,
        descriptor: DeviceDescriptor,
        context: TaskContext,
    ) -> Self {
        let key = key.into();
        let (updates_tx, updates_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(TaskState::Created);
        let stop = CancellationToken::new();

        let poller = Poller {
            key: key.clone(),
            interval: non_zero(interval),
            descriptor,
            context,
            updates: updates_rx,
            stop: stop.clone(),
            state: state_tx,
        };
        tokio::spawn(poller.run());

        Self {
            key,
            updates: updates_tx,
            stop,
            state: state_rx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == TaskState::Stopped
    }

    /// Delivers an update to the task
    ///
    /// Waits while a previous update is still pending.
    pub async fn update(&self, update: TaskUpdate) -> Result<(), TaskError> {
        if self.is_stopped() {
            return Err(TaskError::Stopped(self.key.clone()));
        }

        self.updates
            .send(update)
            .await
            .map_err(|_| TaskError::Stopped(self.key.clone()))
    }

    /// Stops the task and waits until it has exited
    ///
    /// Returns immediately if the task has already stopped.
    pub async fn stop(&self) {
        self.stop.cancel();

        let mut state = self.state.clone();
        // Err: the task dropped its state sender, so it has exited too.
        let _ = state.wait_for(|s| *s == TaskState::Stopped).await;
    }
}

/// Task side of a [`PollTask`]
struct Poller {
    key: String,
    interval: Duration,
    descriptor: DeviceDescriptor,
    context: TaskContext,
    updates: mpsc::Receiver<TaskUpdate>,
    stop: CancellationToken,
    state: watch::Sender<TaskState>,
}

impl Poller {
    async fn run(mut self) {
        self.state.send_replace(TaskState::Running);
        info!(
            "Poll task {} started (interval: {:?}, plc id: {})",
            self.key, self.interval, self.descriptor.id
        );

        let mut ticker = cadence(self.interval);

        loop {
            tokio::select! {
                biased;

                _ = self.context.shutdown.cancelled() => break,
                _ = self.stop.cancelled() => break,
                update = self.updates.recv() => match update {
                    Some(update) => {
                        self.apply(update);
                        ticker = cadence(self.interval);
                    }
                    // Every handle is gone, nobody can stop us anymore.
                    None => break,
                },
                _ = ticker.tick() => {
                    let interrupted = tokio::select! {
                        biased;

                        _ = self.context.shutdown.cancelled() => true,
                        _ = self.stop.cancelled() => true,
                        _ = self.poll_once() => false,
                    };
                    if interrupted {
                        debug!("Poll cycle for {} interrupted", self.key);
                        break;
                    }
                }
            }
        }

        info!("Poll task {} stopped", self.key);
        self.state.send_replace(TaskState::Stopped);
    }

    fn apply(&mut self, update: TaskUpdate) {
        if let Some(interval) = update.interval.filter(|i| !i.is_zero()) {
            self.interval = interval;
        }
        if let Some(descriptor) = update.descriptor.filter(|d| !d.is_empty()) {
            self.descriptor = descriptor;
        }

        debug!(
            "Poll task {} updated (interval: {:?}, plc id: {})",
            self.key, self.interval, self.descriptor.id
        );
    }

    /// Runs one poll cycle
    async fn poll_once(&self) {
        self.context.sink.emit(Event::poll(&self.key));

        if !self.descriptor.is_pollable() {
            debug!("Nothing to read for {} yet", self.key);
            return;
        }

        for register in &self.descriptor.registers {
            let measurement = measure(
                self.context.reader.as_ref(),
                &self.descriptor,
                register,
                self.context.read_timeout,
            )
            .await;

            self.context.gateway.push_measurement(&measurement).await;
        }
    }
}

/// Ticker whose first tick is one period from now
fn cadence(period: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn non_zero(interval: Duration) -> Duration {
    if interval.is_zero() {
        Duration::from_secs(1)
    } else {
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, RecordingSink, ScriptedReader, descriptor};
    use plcpoll_core::domain::measurement::MeasurementStatus;
    use plcpoll_core::dto::event::EventKind;

    struct Harness {
        gateway: Arc<FakeGateway>,
        sink: Arc<RecordingSink>,
        shutdown: CancellationToken,
        context: TaskContext,
    }

    fn harness(reader: ScriptedReader) -> Harness {
        let gateway = Arc::new(FakeGateway::default());
        let sink = Arc::new(RecordingSink::default());
        let shutdown = CancellationToken::new();
        let context = TaskContext {
            gateway: gateway.clone(),
            reader: Arc::new(reader),
            sink: sink.clone(),
            read_timeout: Duration::from_secs(5),
            shutdown: shutdown.clone(),
        };
        Harness {
            gateway,
            sink,
            shutdown,
            context,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions_and_idempotent_stop() {
        let h = harness(ScriptedReader::default());
        let task = PollTask::spawn("a", Duration::from_millis(100), descriptor(1, &[1]), h.context);

        assert_eq!(task.state(), TaskState::Created);
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(task.state(), TaskState::Running);

        task.stop().await;
        assert_eq!(task.state(), TaskState::Stopped);

        // Second stop returns right away.
        task.stop().await;
        assert!(task.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_after_one_interval() {
        let h = harness(ScriptedReader::default());
        let start = Instant::now();
        let task = PollTask::spawn("a", Duration::from_millis(500), descriptor(1, &[1]), h.context);

        time::sleep(Duration::from_millis(499)).await;
        assert_eq!(h.sink.count(EventKind::Poll), 0);

        time::sleep(Duration::from_millis(2)).await;
        let polls = h.sink.polls_for("a");
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0] - start, Duration::from_millis(500));

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_descriptor_polls_without_reads() {
        let h = harness(ScriptedReader::default());
        let task = PollTask::spawn(
            "a",
            Duration::from_millis(100),
            DeviceDescriptor::default(),
            h.context,
        );

        time::sleep(Duration::from_millis(350)).await;
        task.stop().await;

        assert_eq!(h.sink.polls_for("a").len(), 3);
        assert!(h.gateway.pushed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_failure_does_not_abort_cycle() {
        let h = harness(ScriptedReader::default());
        h.gateway.reject_pushes_for(2);
        let task = PollTask::spawn(
            "a",
            Duration::from_millis(100),
            descriptor(9, &[1, 2, 3]),
            h.context,
        );

        time::sleep(Duration::from_millis(250)).await;
        task.stop().await;

        let pushed: Vec<i64> = h.gateway.pushed().iter().map(|m| m.register_id).collect();
        assert_eq!(pushed, vec![1, 3, 1, 3]);
        assert_eq!(h.gateway.rejected().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_becomes_offline_measurement() {
        let h = harness(ScriptedReader::default().failing(2));
        let task = PollTask::spawn(
            "a",
            Duration::from_millis(100),
            descriptor(9, &[1, 2, 3]),
            h.context,
        );

        time::sleep(Duration::from_millis(150)).await;
        task.stop().await;

        let statuses: Vec<(i64, MeasurementStatus)> = h
            .gateway
            .pushed()
            .iter()
            .map(|m| (m.register_id, m.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (1, MeasurementStatus::Online),
                (2, MeasurementStatus::Offline),
                (3, MeasurementStatus::Online),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_reschedules_from_now() {
        let h = harness(ScriptedReader::default());
        let start = Instant::now();
        let task = PollTask::spawn("a", Duration::from_millis(1000), descriptor(1, &[1]), h.context);

        time::sleep(Duration::from_millis(900)).await;
        task.update(TaskUpdate {
            interval: Some(Duration::from_millis(1000)),
            descriptor: None,
        })
        .await
        .unwrap();

        time::sleep(Duration::from_millis(1100)).await;
        task.stop().await;

        let polls = h.sink.polls_for("a");
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0] - start, Duration::from_millis(1900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_replaces_descriptor_but_not_with_empty_one() {
        let h = harness(ScriptedReader::default());
        let task = PollTask::spawn(
            "a",
            Duration::from_millis(100),
            DeviceDescriptor::default(),
            h.context,
        );

        task.update(TaskUpdate {
            interval: None,
            descriptor: Some(descriptor(4, &[10])),
        })
        .await
        .unwrap();
        task.update(TaskUpdate {
            interval: Some(Duration::ZERO),
            descriptor: Some(DeviceDescriptor::default()),
        })
        .await
        .unwrap();

        time::sleep(Duration::from_millis(150)).await;
        task.stop().await;

        let pushed = h.gateway.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!((pushed[0].plc_id, pushed[0].register_id), (4, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_update_blocks_while_task_is_busy() {
        let mut h = harness(ScriptedReader::default().hanging(1));
        h.context.read_timeout = Duration::from_secs(3600);
        let task = PollTask::spawn("a", Duration::from_millis(10), descriptor(1, &[1]), h.context);

        // Let the first cycle start and hang on the read.
        time::sleep(Duration::from_millis(20)).await;

        task.update(TaskUpdate::default()).await.unwrap();
        let second = time::timeout(Duration::from_secs(1), task.update(TaskUpdate::default())).await;
        assert!(second.is_err(), "second update should wait for the first to drain");

        task.stop().await;
        assert!(task.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_cancellation_interrupts_cycle() {
        let mut h = harness(ScriptedReader::default().hanging(2));
        h.context.read_timeout = Duration::from_secs(3600);
        let task = PollTask::spawn(
            "a",
            Duration::from_millis(10),
            descriptor(1, &[1, 2, 3]),
            h.context,
        );

        time::sleep(Duration::from_millis(20)).await;
        h.shutdown.cancel();
        task.stop().await;

        // Register 3 was never reached.
        let pushed: Vec<i64> = h.gateway.pushed().iter().map(|m| m.register_id).collect();
        assert_eq!(pushed, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_after_stop_fails() {
        let h = harness(ScriptedReader::default());
        let task = PollTask::spawn("a", Duration::from_millis(10), descriptor(1, &[1]), h.context);
        task.stop().await;

        let err = task.update(TaskUpdate::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "poll task a has stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_every_handle_ends_task() {
        let h = harness(ScriptedReader::default());
        let task = PollTask::spawn("a", Duration::from_millis(10), descriptor(1, &[1]), h.context);
        let mut state = task.state.clone();
        drop(task);

        state.wait_for(|s| *s == TaskState::Stopped).await.unwrap();
    }
}
