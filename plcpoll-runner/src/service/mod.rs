//! Service layer
//!
//! Services the scheduler is built on: emitting protocol events to the
//! observer and reading registers from devices.
//!
//! Both are trait-based so tests can substitute in-memory versions.

mod event_sink;
mod reader;

// Re-export traits
pub use event_sink::EventSink;
pub use reader::RegisterReader;

// Re-export implementations
pub use event_sink::JsonLinesSink;
pub use reader::{SimulatedReader, measure};
#[cfg(test)]
pub use reader::ReadError;
