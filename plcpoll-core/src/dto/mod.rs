//! Data Transfer Objects
//!
//! Wire shapes exchanged with the outside world: the line protocol that
//! drives the runner (commands in, events out) and the device list returned
//! by the backend.

pub mod command;
pub mod device_list;
pub mod event;
