//! Command loop
//!
//! Reads commands from the line protocol and drives the supervisor. Every
//! way out of the loop goes through a supervisor shutdown, so the observer
//! always sees the terminal `shutdown` event.

use std::ops::ControlFlow;
use std::sync::Arc;

use plcpoll_core::dto::command::Command;
use plcpoll_core::dto::event::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::{Supervisor, SupervisorError};
use crate::service::EventSink;

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A `shutdown` command
    Command,
    /// The input was closed
    EndOfInput,
    /// Process-wide cancellation
    Cancelled,
    /// The input could not be read
    ReadError,
}

pub struct CommandLoop {
    supervisor: Arc<Supervisor>,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
}

impl CommandLoop {
    pub fn new(
        supervisor: Arc<Supervisor>,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            sink,
            shutdown,
        }
    }

    /// Processes commands from `input` until shutdown
    pub async fn run<R>(&self, mut input: R) -> LoopExit
    where
        R: AsyncBufRead + Unpin,
    {
        self.sink.emit(Event::ready());
        info!("Ready for commands");

        let mut line = Vec::new();
        let exit = loop {
            line.clear();
            let read = tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break LoopExit::Cancelled,
                read = input.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => break LoopExit::EndOfInput,
                Ok(_) => {
                    if self.handle_line(&line).await.is_break() {
                        break LoopExit::Command;
                    }
                }
                Err(e) => {
                    warn!("Failed to read command input: {}", e);
                    self.sink
                        .emit(Event::error(format!("failed to read command: {}", e)));
                    break LoopExit::ReadError;
                }
            }
        };

        if self.supervisor.is_empty() {
            info!("Command loop ending ({:?})", exit);
        } else {
            info!(
                "Command loop ending ({:?}), still polling {:?}",
                exit,
                self.supervisor.keys()
            );
        }
        self.supervisor.shutdown().await;
        exit
    }

    async fn handle_line(&self, line: &[u8]) -> ControlFlow<()> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return ControlFlow::Continue(());
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Rejected command: {}", e);
                self.sink.emit(Event::error(e.to_string()));
                return ControlFlow::Continue(());
            }
        };
        debug!("Received {} command", command.name());

        let (key, result) = match command {
            Command::Add { key, interval } => {
                let result = self.supervisor.add(&key, interval).await;
                (key, result)
            }
            Command::Update { key, interval } => {
                let result = self.supervisor.update(&key, interval).await;
                (key, result)
            }
            Command::Remove { key } => {
                let result = self.supervisor.remove(&key).await;
                (key, result)
            }
            Command::Shutdown => return ControlFlow::Break(()),
        };

        if let Err(e) = result {
            self.report(&key, e);
        }
        debug!("{} poll task(s) active", self.supervisor.len());
        ControlFlow::Continue(())
    }

    fn report(&self, key: &str, error: SupervisorError) {
        warn!("Command for {:?} failed: {}", key, error);

        let key = key.trim();
        let event = Event::error(error.to_string());
        if key.is_empty() {
            self.sink.emit(event);
        } else {
            self.sink.emit(event.with_key(key));
        }
    }
}
