//! File watching for restart-on-change.
//!
//! Polls modification times of the watch roots on a fixed interval and
//! emits an event whenever a file appears or changes. The supervisor
//! turns those events into graceful restarts of the owning app.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::debug;

use crate::config::ProcessDescriptor;

/// A detected change in a watched file.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// Name of the app whose files changed.
    pub name: String,

    /// Path of the file that appeared or changed.
    pub path: PathBuf,
}

/// Polling file watcher for a single app.
#[derive(Debug)]
pub struct FileWatcher {
    name: String,
    roots: Vec<PathBuf>,
    ignores: Vec<PathBuf>,
    poll_interval: Duration,
}

impl FileWatcher {
    /// Creates a watcher for the app's entry point and its directory.
    #[must_use]
    pub fn for_app(descriptor: &ProcessDescriptor, poll_interval: Duration) -> Self {
        let script = descriptor.resolved_script();
        let mut roots = vec![script.clone()];
        if let Some(parent) = script.parent() {
            if !parent.as_os_str().is_empty() {
                roots.push(parent.to_path_buf());
            }
        }

        Self {
            name: descriptor.name.clone(),
            roots,
            ignores: Vec::new(),
            poll_interval,
        }
    }

    /// Excludes a path from change detection.
    ///
    /// The supervisor's own artifacts (the state file in particular) can
    /// land inside a watch root; changes to them must not restart the app.
    #[must_use]
    pub fn ignoring(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignores.push(path.into());
        self
    }

    /// Runs the polling loop, sending a [`WatchEvent`] per changed file.
    ///
    /// Exits when the receiving side is dropped.
    pub async fn run(self, tx: mpsc::Sender<WatchEvent>) {
        let mut timestamps = scan(&self.roots, &self.ignores);
        let mut poll = interval(self.poll_interval);
        poll.tick().await; // first tick completes immediately

        loop {
            poll.tick().await;

            let current = scan(&self.roots, &self.ignores);
            for path in changed_paths(&timestamps, &current) {
                debug!(app = %self.name, path = %path.display(), "File change detected");
                let event = WatchEvent {
                    name: self.name.clone(),
                    path,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            timestamps = current;
        }
    }
}

/// Collects modification times for all files under the given roots.
///
/// A root that is a file contributes itself; a root that is a directory
/// contributes its direct file entries. Ignored paths and unreadable
/// entries are skipped.
fn scan(roots: &[PathBuf], ignores: &[PathBuf]) -> HashMap<PathBuf, SystemTime> {
    // Canonicalize at scan time so relative spellings ("./keeper-state.json"
    // vs "keeper-state.json") and late-created files still match.
    let ignored: Vec<PathBuf> = ignores.iter().map(|p| normalize(p)).collect();
    let is_ignored = |path: &Path| ignored.contains(&normalize(path));

    let mut timestamps = HashMap::new();

    for root in roots {
        if root.is_file() {
            if !is_ignored(root) {
                if let Some(modified) = mtime(root) {
                    timestamps.insert(root.clone(), modified);
                }
            }
        } else if let Ok(entries) = std::fs::read_dir(root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && !is_ignored(&path) {
                    if let Some(modified) = mtime(&path) {
                        timestamps.insert(path, modified);
                    }
                }
            }
        }
    }

    timestamps
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Returns paths that are new or have a different modification time.
fn changed_paths(
    previous: &HashMap<PathBuf, SystemTime>,
    current: &HashMap<PathBuf, SystemTime>,
) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = current
        .iter()
        .filter(|(path, modified)| previous.get(*path) != Some(*modified))
        .map(|(path, _)| path.clone())
        .collect();
    changed.sort();
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_scan_picks_up_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        std::fs::File::create(&script)
            .unwrap()
            .write_all(b"print('ok')\n")
            .unwrap();

        let timestamps = scan(&[dir.path().to_path_buf()], &[]);
        assert!(timestamps.contains_key(&script));
    }

    #[test]
    fn test_changed_paths_detects_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let roots = vec![dir.path().to_path_buf()];

        let before = scan(&roots, &[]);

        let script = dir.path().join("app.py");
        std::fs::File::create(&script).unwrap();

        let after = scan(&roots, &[]);
        let changed = changed_paths(&before, &after);
        assert_eq!(changed, vec![script]);
    }

    #[test]
    fn test_changed_paths_ignores_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        std::fs::File::create(&script).unwrap();

        let roots = vec![dir.path().to_path_buf()];
        let first = scan(&roots, &[]);
        let second = scan(&roots, &[]);

        assert!(changed_paths(&first, &second).is_empty());
    }

    #[test]
    fn test_changed_paths_detects_mtime_change() {
        let path = PathBuf::from("app.py");
        let earlier = SystemTime::UNIX_EPOCH;
        let later = SystemTime::UNIX_EPOCH + Duration::from_secs(60);

        let before = HashMap::from([(path.clone(), earlier)]);
        let after = HashMap::from([(path.clone(), later)]);

        assert_eq!(changed_paths(&before, &after), vec![path]);
    }

    #[test]
    fn test_scan_skips_ignored_paths() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        let state_file = dir.path().join("keeper-state.json");
        std::fs::File::create(&script).unwrap();
        std::fs::File::create(&state_file).unwrap();

        let roots = vec![dir.path().to_path_buf()];
        let timestamps = scan(&roots, &[state_file.clone()]);

        assert!(timestamps.contains_key(&script));
        assert!(!timestamps.contains_key(&state_file));
    }

    #[test]
    fn test_scan_ignores_relative_spelling_of_ignored_path() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("keeper-state.json");
        std::fs::File::create(&state_file).unwrap();

        // Ignore entry spelled with a redundant "." component
        let ignore = dir.path().join(".").join("keeper-state.json");
        let timestamps = scan(&[dir.path().to_path_buf()], &[ignore]);

        assert!(!timestamps.contains_key(&state_file));
    }

    #[test]
    fn test_ignored_file_changes_emit_no_events() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.py");
        std::fs::File::create(&script).unwrap();
        let state_file = dir.path().join("keeper-state.json");

        let mut descriptor = ProcessDescriptor::new("bot".to_owned(), script);
        descriptor.watch = true;

        let roots = FileWatcher::for_app(&descriptor, Duration::from_secs(1))
            .ignoring(&state_file)
            .roots;

        let before = scan(&roots, &[state_file.clone()]);
        std::fs::write(&state_file, "{}").unwrap();
        let after = scan(&roots, &[state_file]);

        assert!(changed_paths(&before, &after).is_empty());
    }

    #[test]
    fn test_for_app_watches_script_and_parent() {
        let mut descriptor = ProcessDescriptor::new(
            "bot".to_owned(),
            PathBuf::from("app.py"),
        );
        descriptor.cwd = Some(PathBuf::from("/srv/bot"));

        let watcher = FileWatcher::for_app(&descriptor, Duration::from_secs(1));
        assert_eq!(
            watcher.roots,
            vec![PathBuf::from("/srv/bot/app.py"), PathBuf::from("/srv/bot")]
        );
    }
}
