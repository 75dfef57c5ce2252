//! Child process management module.
//!
//! Provides launching of supervised applications with their declared
//! environment, log forwarding, graceful termination, and file watching
//! for restart-on-change.

mod spawn;
mod watcher;

pub use spawn::{ManagedChild, SpawnError, build_command};
pub use watcher::{FileWatcher, WatchEvent};
