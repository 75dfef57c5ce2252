//! Process supervision module.
//!
//! Runs one supervision task per configured app: launches the process,
//! restarts it on exit or file change according to the restart policy,
//! and tracks per-app state across supervisor restarts.

mod runner;
mod state;

pub use runner::{Supervisor, SupervisorMessage};
pub use state::{PersistentState, ProcessState, ProcessStatus, SupervisorState};
