//! Event sink service
//!
//! Emits protocol events to the observer, one JSON line per event. The
//! writer is behind a mutex so concurrent emitters never interleave partial
//! lines.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use plcpoll_core::dto::event::Event;
use tracing::warn;

/// Service for reporting events to the observer
///
/// `emit` is synchronous and is called from async tasks. Implementations
/// writing to a pipe block the calling worker thread while the observer is
/// not reading, so the observer must drain its end promptly.
pub trait EventSink: Send + Sync {
    /// Emits one event
    ///
    /// Emission never fails from the caller's point of view; write errors
    /// are logged.
    fn emit(&self, event: Event);
}

/// Writes each event as one JSON line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Gives the underlying writer back
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl JsonLinesSink<std::io::Stdout> {
    /// Sink writing to the process stdout
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: Event) {
        let line = match event.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode event {:?}: {}", event.event, e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!("Failed to send event {:?}: {}", event.event, e);
        }
    }
}
