//! Supervisor runner.
//!
//! One supervision task per app:
//! 1. Launch the process with its declared environment
//! 2. Wait for exit, a restart request, or shutdown
//! 3. On exit: relaunch after the configured delay; exits faster than the
//!    minimum uptime count as rapid failures and after too many consecutive
//!    ones the app is marked errored and abandoned
//! 4. On restart request (file change or operator): stop gracefully and
//!    relaunch without counting toward the crash limit
//!
//! State transitions are persisted immediately so restart counters survive
//! supervisor restarts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::SupervisorState;
use crate::config::{EcosystemConfig, KeeperSettings, ProcessDescriptor};
use crate::process::{FileWatcher, ManagedChild, WatchEvent};

/// Messages that can be sent to the supervisor.
#[derive(Debug, Clone)]
pub enum SupervisorMessage {
    /// Gracefully restart the named app.
    Restart(String),
    /// Stop all apps and shut down.
    Shutdown,
}

/// Process supervisor for a validated ecosystem configuration.
pub struct Supervisor {
    /// Validated launch descriptors. Immutable while running.
    config: Arc<EcosystemConfig>,

    /// Restart policy and watcher settings.
    settings: KeeperSettings,

    /// Shared per-app state.
    state: Arc<RwLock<SupervisorState>>,
}

impl Supervisor {
    /// Creates a new supervisor.
    #[must_use]
    pub fn new(
        config: Arc<EcosystemConfig>,
        settings: KeeperSettings,
        state: Arc<RwLock<SupervisorState>>,
    ) -> Self {
        Self {
            config,
            settings,
            state,
        }
    }

    /// Runs all apps until a shutdown message arrives.
    pub async fn run(&self, mut rx: mpsc::Receiver<SupervisorMessage>) {
        info!("Supervisor started ({} apps)", self.config.len());

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (watch_tx, mut watch_rx) = mpsc::channel::<WatchEvent>(32);

        let mut restart_senders: HashMap<String, mpsc::Sender<()>> = HashMap::new();
        let mut tasks = JoinSet::new();
        let mut watchers = JoinSet::new();

        for app in &self.config.apps {
            let (restart_tx, restart_rx) = mpsc::channel::<()>(4);
            restart_senders.insert(app.name.clone(), restart_tx);

            if app.watch {
                // The state file may sit inside a watch root; saving state
                // must never count as a source change
                let watcher = FileWatcher::for_app(app, self.settings.watch_interval())
                    .ignoring(&self.settings.state_path);
                watchers.spawn(watcher.run(watch_tx.clone()));
                info!(app = %app.name, "File watching enabled");
            }

            tasks.spawn(supervise_app(
                app.clone(),
                self.settings.clone(),
                Arc::clone(&self.state),
                restart_rx,
                shutdown_tx.subscribe(),
            ));
        }
        drop(watch_tx);

        loop {
            tokio::select! {
                Some(event) = watch_rx.recv() => {
                    info!(
                        app = %event.name,
                        path = %event.path.display(),
                        "Watched file changed, restarting"
                    );
                    if let Some(tx) = restart_senders.get(&event.name) {
                        let _ = tx.try_send(());
                    }
                }
                msg = rx.recv() => {
                    match msg {
                        Some(SupervisorMessage::Restart(name)) => {
                            match restart_senders.get(&name) {
                                Some(tx) => {
                                    let _ = tx.try_send(());
                                }
                                None => warn!(app = %name, "Restart requested for unknown app"),
                            }
                        }
                        Some(SupervisorMessage::Shutdown) | None => {
                            info!("Supervisor shutting down");
                            break;
                        }
                    }
                }
            }
        }

        watchers.abort_all();
        let _ = shutdown_tx.send(());
        while tasks.join_next().await.is_some() {}

        let state = self.state.read().await;
        persist(&state, &self.settings);
        info!("Supervisor stopped");
    }

    /// Gets a reference to the supervisor state.
    #[must_use]
    pub fn state(&self) -> &Arc<RwLock<SupervisorState>> {
        &self.state
    }

    /// Gets a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<EcosystemConfig> {
        &self.config
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("apps", &self.config.len())
            .finish_non_exhaustive()
    }
}

/// Supervision loop for a single app.
async fn supervise_app(
    descriptor: ProcessDescriptor,
    settings: KeeperSettings,
    state: Arc<RwLock<SupervisorState>>,
    mut restart_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(app = %descriptor.name, "Supervision started");

    let mut rapid_failures: u32 = 0;

    loop {
        {
            let mut st = state.write().await;
            st.entry(&descriptor.name).mark_starting();
            persist(&st, &settings);
        }

        let mut child = match ManagedChild::spawn(&descriptor) {
            Ok(child) => child,
            Err(e) => {
                error!(app = %descriptor.name, "Launch failed: {}", e);
                let mut st = state.write().await;
                st.entry(&descriptor.name).mark_errored(None);
                persist(&st, &settings);
                return;
            }
        };

        {
            let mut st = state.write().await;
            st.entry(&descriptor.name).mark_online(child.pid());
            persist(&st, &settings);
        }
        info!(app = %descriptor.name, pid = ?child.pid(), "Process online");

        tokio::select! {
            result = child.wait() => {
                let exit_code = result.as_ref().ok().and_then(std::process::ExitStatus::code);
                let uptime = child.uptime();

                if let Err(e) = result {
                    error!(app = %descriptor.name, "Failed to wait for child: {}", e);
                }

                if uptime < settings.min_uptime() {
                    rapid_failures += 1;
                } else {
                    rapid_failures = 0;
                }

                if rapid_failures > settings.max_restarts {
                    error!(
                        app = %descriptor.name,
                        failures = rapid_failures,
                        "Too many rapid failures, giving up"
                    );
                    let mut st = state.write().await;
                    st.entry(&descriptor.name).mark_errored(exit_code);
                    persist(&st, &settings);
                    return;
                }

                warn!(
                    app = %descriptor.name,
                    exit_code = ?exit_code,
                    delay_ms = settings.restart_delay_ms,
                    "Process exited, restarting after delay"
                );
                {
                    let mut st = state.write().await;
                    st.entry(&descriptor.name).mark_restarting(exit_code);
                    persist(&st, &settings);
                }

                tokio::select! {
                    () = tokio::time::sleep(settings.restart_delay()) => {}
                    _ = shutdown_rx.recv() => {
                        let mut st = state.write().await;
                        st.entry(&descriptor.name).mark_stopped();
                        persist(&st, &settings);
                        return;
                    }
                }
            }
            Some(()) = restart_rx.recv() => {
                info!(app = %descriptor.name, "Restart requested, stopping process");
                let exit = child.stop(settings.shutdown_timeout()).await.ok();
                rapid_failures = 0;

                let mut st = state.write().await;
                st.entry(&descriptor.name)
                    .mark_restarting(exit.and_then(|s| s.code()));
                persist(&st, &settings);
            }
            _ = shutdown_rx.recv() => {
                info!(app = %descriptor.name, "Shutdown requested, stopping process");
                if let Err(e) = child.stop(settings.shutdown_timeout()).await {
                    warn!(app = %descriptor.name, "Failed to stop process: {}", e);
                }
                let mut st = state.write().await;
                st.entry(&descriptor.name).mark_stopped();
                persist(&st, &settings);
                return;
            }
        }
    }
}

/// Saves a state snapshot, logging instead of failing on error.
fn persist(state: &SupervisorState, settings: &KeeperSettings) {
    if let Err(e) = state.to_persistent().save(&settings.state_path) {
        warn!("Failed to save state: {}", e);
    }
}
