//! Core domain types
//!
//! These types describe the devices being polled and the measurements taken
//! from them. They are shared between the HTTP client (which fetches and
//! pushes them) and the runner (which schedules the polling).

pub mod device;
pub mod key;
pub mod measurement;
