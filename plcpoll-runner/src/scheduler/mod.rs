//! Scheduler layer for the runner
//!
//! This layer owns the poll tasks: one independently scheduled task per
//! managed key, and the supervisor that starts, updates and stops them.

pub mod supervisor;
pub mod task;

pub use supervisor::{Supervisor, SupervisorError};
pub use task::TaskContext;
