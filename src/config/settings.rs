//! Supervisor runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_RESTARTS, DEFAULT_MIN_UPTIME_MS, DEFAULT_RESTART_DELAY_MS};

/// Runtime settings for the supervisor itself.
///
/// These parameterize the restart policy and the file watcher;
/// they are distinct from the per-app launch descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperSettings {
    /// Path to the persisted supervisor state file.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Delay before relaunching an exited process, in milliseconds.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// Consecutive rapid failures tolerated before an app is abandoned.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Uptime below which an exit counts as a rapid failure, in milliseconds.
    #[serde(default = "default_min_uptime_ms")]
    pub min_uptime_ms: u64,

    /// Interval between file-watch polls, in milliseconds.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Seconds to wait after SIGTERM before force-killing a child.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Log level for the application.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("keeper-state.json")
}

fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}

fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}

fn default_min_uptime_ms() -> u64 {
    DEFAULT_MIN_UPTIME_MS
}

fn default_watch_interval_ms() -> u64 {
    1000
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            restart_delay_ms: default_restart_delay_ms(),
            max_restarts: default_max_restarts(),
            min_uptime_ms: default_min_uptime_ms(),
            watch_interval_ms: default_watch_interval_ms(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl KeeperSettings {
    /// Creates settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            state_path: std::env::var("KEEPER_STATE_PATH")
                .map_or_else(|_| default_state_path(), PathBuf::from),
            restart_delay_ms: std::env::var("KEEPER_RESTART_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_restart_delay_ms),
            max_restarts: std::env::var("KEEPER_MAX_RESTARTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_max_restarts),
            min_uptime_ms: std::env::var("KEEPER_MIN_UPTIME_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_min_uptime_ms),
            watch_interval_ms: std::env::var("KEEPER_WATCH_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_watch_interval_ms),
            shutdown_timeout_secs: std::env::var("KEEPER_SHUTDOWN_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_shutdown_timeout),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_level()),
        }
    }

    /// Returns the restart delay as a [`Duration`].
    #[must_use]
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Returns the minimum uptime as a [`Duration`].
    #[must_use]
    pub const fn min_uptime(&self) -> Duration {
        Duration::from_millis(self.min_uptime_ms)
    }

    /// Returns the watch poll interval as a [`Duration`].
    #[must_use]
    pub const fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Returns the graceful shutdown timeout as a [`Duration`].
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = KeeperSettings::default();
        assert_eq!(settings.restart_delay_ms, 1000);
        assert_eq!(settings.max_restarts, 16);
        assert_eq!(settings.min_uptime_ms, 1000);
        assert_eq!(settings.state_path, PathBuf::from("keeper-state.json"));
    }

    #[test]
    fn test_duration_accessors() {
        let settings = KeeperSettings::default();
        assert_eq!(settings.restart_delay(), Duration::from_millis(1000));
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(5));
    }
}
