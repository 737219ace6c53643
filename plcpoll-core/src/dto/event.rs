//! Events of the line protocol
//!
//! One JSON object per line, e.g. `{"event":"added","key":"10.0.0.5"}`.

use serde::{Deserialize, Serialize};

/// Kind of an emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Ready,
    Added,
    Updated,
    Removed,
    Poll,
    Error,
    Shutdown,
}

/// An event reported to the observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event {
    pub fn new(event: EventKind) -> Self {
        Self {
            event,
            key: None,
            message: None,
        }
    }

    pub fn ready() -> Self {
        Self::new(EventKind::Ready)
    }

    pub fn added(key: impl Into<String>) -> Self {
        Self::new(EventKind::Added).with_key(key)
    }

    pub fn updated(key: impl Into<String>) -> Self {
        Self::new(EventKind::Updated).with_key(key)
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self::new(EventKind::Removed).with_key(key)
    }

    pub fn poll(key: impl Into<String>) -> Self {
        Self::new(EventKind::Poll).with_key(key)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(EventKind::Error)
        }
    }

    pub fn shutdown() -> Self {
        Self::new(EventKind::Shutdown)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Encodes the event as one protocol line, without the trailing newline
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
