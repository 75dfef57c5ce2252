//! Supervisor state management.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Not launched yet, or shut down by the supervisor.
    #[default]
    Stopped,
    /// Launch in progress.
    Starting,
    /// Running.
    Online,
    /// Exited; relaunch pending.
    Restarting,
    /// Gave up after repeated rapid failures or a launch error.
    Errored,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Online => "online",
            Self::Restarting => "restarting",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Runtime state of a single supervised process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessState {
    /// Current lifecycle status.
    pub status: ProcessStatus,

    /// OS process id while online.
    pub pid: Option<u32>,

    /// Total number of relaunches performed for this app.
    pub restarts: u32,

    /// When the current process instance was started.
    pub started_at: Option<DateTime<Utc>>,

    /// Exit code of the most recent exit, if any.
    pub last_exit_code: Option<i32>,
}

impl ProcessState {
    /// Marks a launch attempt in progress.
    pub fn mark_starting(&mut self) {
        self.status = ProcessStatus::Starting;
        self.pid = None;
    }

    /// Marks the process as running with the given pid.
    pub fn mark_online(&mut self, pid: Option<u32>) {
        self.status = ProcessStatus::Online;
        self.pid = pid;
        self.started_at = Some(Utc::now());
    }

    /// Records an exit and schedules a relaunch.
    pub fn mark_restarting(&mut self, exit_code: Option<i32>) {
        self.status = ProcessStatus::Restarting;
        self.pid = None;
        self.last_exit_code = exit_code;
        self.restarts += 1;
    }

    /// Marks the process as deliberately stopped.
    pub fn mark_stopped(&mut self) {
        self.status = ProcessStatus::Stopped;
        self.pid = None;
    }

    /// Marks the process as abandoned after repeated failures.
    pub fn mark_errored(&mut self, exit_code: Option<i32>) {
        self.status = ProcessStatus::Errored;
        self.pid = None;
        if exit_code.is_some() {
            self.last_exit_code = exit_code;
        }
    }
}

/// Persistent state that survives supervisor restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistentState {
    /// Per-app state keyed by app name.
    pub apps: BTreeMap<String, ProcessState>,
}

impl PersistentState {
    /// Loads state from a JSON file, returns default if not found.
    pub fn load(path: impl AsRef<Path>) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Saves state to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

/// In-memory state of the supervisor.
#[derive(Debug, Default)]
pub struct SupervisorState {
    apps: HashMap<String, ProcessState>,
}

impl SupervisorState {
    /// Creates an empty supervisor state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates state from persistent state loaded from disk.
    ///
    /// Statuses recorded as running in a previous supervisor instance are
    /// stale, so anything not stopped or errored is reset to stopped while
    /// the restart counters are kept.
    #[must_use]
    pub fn from_persistent(persistent: &PersistentState) -> Self {
        let mut apps = HashMap::new();

        for (name, saved) in &persistent.apps {
            let mut state = saved.clone();
            if !matches!(state.status, ProcessStatus::Stopped | ProcessStatus::Errored) {
                state.status = ProcessStatus::Stopped;
            }
            state.pid = None;
            apps.insert(name.clone(), state);
        }

        Self { apps }
    }

    /// Converts to persistent state for saving.
    #[must_use]
    pub fn to_persistent(&self) -> PersistentState {
        PersistentState {
            apps: self
                .apps
                .iter()
                .map(|(name, state)| (name.clone(), state.clone()))
                .collect(),
        }
    }

    /// Gets the state of an app, if tracked.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProcessState> {
        self.apps.get(name)
    }

    /// Gets the state of an app, creating a default entry if needed.
    pub fn entry(&mut self, name: &str) -> &mut ProcessState {
        self.apps.entry(name.to_owned()).or_default()
    }

    /// Returns the number of tracked apps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Checks if no apps are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_process_state() {
        let state = ProcessState::default();
        assert_eq!(state.status, ProcessStatus::Stopped);
        assert_eq!(state.restarts, 0);
        assert!(state.pid.is_none());
        assert!(state.last_exit_code.is_none());
    }

    #[test]
    fn test_mark_restarting_counts_and_records_exit() {
        let mut state = ProcessState::default();
        state.mark_online(Some(1234));
        state.mark_restarting(Some(1));

        assert_eq!(state.status, ProcessStatus::Restarting);
        assert_eq!(state.restarts, 1);
        assert_eq!(state.last_exit_code, Some(1));
        assert!(state.pid.is_none());
    }

    #[test]
    fn test_from_persistent_resets_stale_online_status() {
        let mut persistent = PersistentState::default();
        let mut saved = ProcessState::default();
        saved.mark_online(Some(42));
        saved.restarts = 7;
        persistent.apps.insert("bot".to_owned(), saved);

        let state = SupervisorState::from_persistent(&persistent);
        let bot = state.get("bot").unwrap();

        assert_eq!(bot.status, ProcessStatus::Stopped);
        assert!(bot.pid.is_none());
        assert_eq!(bot.restarts, 7);
    }

    #[test]
    fn test_from_persistent_keeps_errored_status() {
        let mut persistent = PersistentState::default();
        let mut saved = ProcessState::default();
        saved.mark_errored(Some(1));
        persistent.apps.insert("bot".to_owned(), saved);

        let state = SupervisorState::from_persistent(&persistent);
        assert_eq!(state.get("bot").unwrap().status, ProcessStatus::Errored);
    }

    #[test]
    fn test_persistent_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = SupervisorState::new();
        state.entry("bot").mark_online(Some(99));
        state.entry("bot").restarts = 3;

        state.to_persistent().save(&path).unwrap();
        let loaded = PersistentState::load(&path);

        assert_eq!(loaded.apps.get("bot").map(|s| s.restarts), Some(3));
    }

    #[test]
    fn test_persistent_load_missing_file_is_default() {
        let loaded = PersistentState::load("no-such-state-file.json");
        assert!(loaded.apps.is_empty());
    }
}
