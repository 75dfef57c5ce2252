//! Configuration module for the supervisor.
//!
//! Handles loading, validation, and management of the ecosystem
//! configuration (the set of applications to supervise) and the
//! supervisor's own runtime settings.

mod ecosystem;
mod settings;

pub use ecosystem::{EcosystemConfig, ProcessDescriptor, ValidationError};
pub use settings::KeeperSettings;

/// Default delay before relaunching an exited process, in milliseconds.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 1000;

/// Default number of consecutive rapid failures before an app is abandoned.
pub const DEFAULT_MAX_RESTARTS: u32 = 16;

/// Default uptime below which an exit counts as a rapid failure, in milliseconds.
pub const DEFAULT_MIN_UPTIME_MS: u64 = 1000;
