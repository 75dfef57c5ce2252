//! Child process launching and termination.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::ProcessDescriptor;

/// Errors that can occur while launching a child process.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Script for app '{name}' not found at {path}")]
    ScriptNotFound { name: String, path: PathBuf },

    #[error("Failed to launch app '{name}': '{command}' not found on this host")]
    CommandNotFound { name: String, command: String },

    #[error("Failed to spawn app '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the launch command for a descriptor.
///
/// When an interpreter is configured, the script path becomes its first
/// argument; otherwise the script itself is executed. The declared
/// environment is injected verbatim on top of the inherited one.
#[must_use]
pub fn build_command(descriptor: &ProcessDescriptor) -> Command {
    let mut command = match &descriptor.interpreter {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.arg(&descriptor.script);
            cmd
        }
        None => Command::new(&descriptor.script),
    };

    command.args(&descriptor.args);
    command.envs(&descriptor.env);

    if let Some(cwd) = &descriptor.cwd {
        command.current_dir(cwd);
    }

    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    command
}

/// A running child process under supervision.
pub struct ManagedChild {
    /// Name of the app this child belongs to.
    pub name: String,

    child: Child,

    started_at: Instant,
}

impl ManagedChild {
    /// Launches the process described by `descriptor`.
    ///
    /// Output is forwarded line-by-line to the log, tagged with the app name.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::ScriptNotFound`] if the entry point is missing
    /// on disk, [`SpawnError::CommandNotFound`] if the interpreter (or the
    /// script itself, when no interpreter is set) cannot be found on the
    /// host, and [`SpawnError::Io`] for other spawn failures.
    pub fn spawn(descriptor: &ProcessDescriptor) -> Result<Self, SpawnError> {
        if !descriptor.script_exists() {
            return Err(SpawnError::ScriptNotFound {
                name: descriptor.name.clone(),
                path: descriptor.resolved_script(),
            });
        }

        let mut command = build_command(descriptor);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                let launched = descriptor
                    .interpreter
                    .clone()
                    .unwrap_or_else(|| descriptor.script.display().to_string());
                SpawnError::CommandNotFound {
                    name: descriptor.name.clone(),
                    command: launched,
                }
            } else {
                SpawnError::Io {
                    name: descriptor.name.clone(),
                    source: e,
                }
            }
        })?;

        forward_output(&descriptor.name, &mut child);

        Ok(Self {
            name: descriptor.name.clone(),
            child,
            started_at: Instant::now(),
        })
    }

    /// Returns the OS process id, if the child is still running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Returns how long the child has been running.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Waits for the child to exit.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stops the child gracefully.
    ///
    /// On unix, sends SIGTERM and waits up to `timeout` for the child to
    /// exit before force-killing it. Elsewhere the child is killed directly.
    pub async fn stop(&mut self, timeout: Duration) -> std::io::Result<ExitStatus> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(raw) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) {
                if kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok() {
                    match tokio::time::timeout(timeout, self.child.wait()).await {
                        Ok(status) => return status,
                        Err(_) => {
                            warn!(
                                app = %self.name,
                                "Child did not exit after SIGTERM, force-killing"
                            );
                        }
                    }
                }
            }
        }

        #[cfg(not(unix))]
        let _ = timeout;

        self.child.kill().await?;
        self.child.wait().await
    }
}

impl std::fmt::Debug for ManagedChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedChild")
            .field("name", &self.name)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

/// Forwards child stdout/stderr lines to the log, tagged with the app name.
fn forward_output(name: &str, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        let app = name.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(app = %app, "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let app = name.to_owned();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(app = %app, "{}", line);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::path::PathBuf;

    fn shell_descriptor(dir: &tempfile::TempDir, body: &str) -> ProcessDescriptor {
        let script = dir.path().join("app.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "{body}").unwrap();
        let mut descriptor = ProcessDescriptor::new("test app".to_owned(), script);
        descriptor.interpreter = Some("sh".to_owned());
        descriptor
    }

    #[test]
    fn test_build_command_passes_env_verbatim() {
        let mut descriptor =
            ProcessDescriptor::new("NST telegram bot".to_owned(), PathBuf::from("./app.py"));
        descriptor.interpreter = Some("python".to_owned());
        descriptor.env.insert("LR".to_owned(), "0.005".to_owned());
        descriptor.env.insert("EPOCHS".to_owned(), "500".to_owned());

        let command = build_command(&descriptor);
        let envs: Vec<_> = command.as_std().get_envs().collect();

        assert!(envs.contains(&("LR".as_ref(), Some("0.005".as_ref()))));
        assert!(envs.contains(&("EPOCHS".as_ref(), Some("500".as_ref()))));
    }

    #[test]
    fn test_build_command_interpreter_gets_script_as_first_arg() {
        let mut descriptor =
            ProcessDescriptor::new("bot".to_owned(), PathBuf::from("./app.py"));
        descriptor.interpreter = Some("python".to_owned());

        let command = build_command(&descriptor);
        let std_cmd = command.as_std();

        assert_eq!(std_cmd.get_program(), "python");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec![std::ffi::OsStr::new("./app.py")]);
    }

    #[test]
    fn test_spawn_missing_script_fails_fast() {
        let descriptor = ProcessDescriptor::new(
            "NST telegram bot".to_owned(),
            PathBuf::from("./app.py.does-not-exist"),
        );
        let result = ManagedChild::spawn(&descriptor);
        assert!(matches!(result, Err(SpawnError::ScriptNotFound { .. })));
    }

    #[tokio::test]
    async fn test_spawn_missing_interpreter_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = shell_descriptor(&dir, "exit 0");
        descriptor.interpreter = Some("interpreter-that-does-not-exist".to_owned());

        let result = ManagedChild::spawn(&descriptor);
        assert!(matches!(result, Err(SpawnError::CommandNotFound { .. })));
    }

    #[tokio::test]
    async fn test_spawn_and_wait_success() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = shell_descriptor(&dir, "exit 0");

        let mut child = ManagedChild::spawn(&descriptor).unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_reports_child_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = shell_descriptor(&dir, "exit 3");

        let mut child = ManagedChild::spawn(&descriptor).unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_stop_terminates_long_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = shell_descriptor(&dir, "sleep 30");

        let mut child = ManagedChild::spawn(&descriptor).unwrap();
        assert!(child.pid().is_some());

        let status = child.stop(Duration::from_secs(2)).await.unwrap();
        assert!(!status.success());
    }
}
