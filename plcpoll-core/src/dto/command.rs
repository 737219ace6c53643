//! Commands of the line protocol
//!
//! One JSON object per line, e.g.
//! `{"cmd":"add","key":"10.0.0.5|7","interval":500}`.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors produced while decoding a command line
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unknown command: {0}")]
    Unknown(String),
}

/// A decoded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        key: String,
        interval: Option<Duration>,
    },
    Update {
        key: String,
        interval: Option<Duration>,
    },
    Remove {
        key: String,
    },
    Shutdown,
}

/// Raw line shape before the command kind is checked
#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(default)]
    cmd: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    interval: Option<i64>,
}

impl Command {
    /// Decodes one protocol line
    ///
    /// Takes raw bytes: a line that is not UTF-8 is malformed like any other
    /// undecodable line.
    pub fn parse(line: impl AsRef<[u8]>) -> Result<Self, ProtocolError> {
        let raw: RawCommand = serde_json::from_slice(line.as_ref())?;
        let key = raw.key.unwrap_or_default();
        let interval = interval_from_millis(raw.interval);

        match raw.cmd.as_str() {
            "add" => Ok(Command::Add { key, interval }),
            "update" => Ok(Command::Update { key, interval }),
            "remove" => Ok(Command::Remove { key }),
            "shutdown" => Ok(Command::Shutdown),
            _ => Err(ProtocolError::Unknown(raw.cmd)),
        }
    }

    /// Protocol name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Update { .. } => "update",
            Command::Remove { .. } => "remove",
            Command::Shutdown => "shutdown",
        }
    }
}

/// Non-positive intervals mean "not given"
fn interval_from_millis(raw: Option<i64>) -> Option<Duration> {
    raw.and_then(|ms| u64::try_from(ms).ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
