//! Ecosystem configuration and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during ecosystem validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("App at index {index} has an empty name")]
    EmptyName { index: usize },

    #[error("Duplicate app name found: {name}")]
    DuplicateName { name: String },

    #[error("App at index {index} (name: {name}) has an empty script path")]
    EmptyScript { index: usize, name: String },

    #[error("App at index {index} (name: {name}): script not found at {path}")]
    ScriptNotFound {
        index: usize,
        name: String,
        path: PathBuf,
    },

    #[error("No apps configured")]
    NoApps,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Declarative launch descriptor for a single supervised application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessDescriptor {
    /// Unique process name used in logs and state.
    pub name: String,

    /// Entry point the supervisor invokes to start the process.
    pub script: PathBuf,

    /// Interpreter to run the script with (e.g. "python").
    /// When unset, the script is executed directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,

    /// Restart the process when its source files change on disk.
    #[serde(default)]
    pub watch: bool,

    /// Extra arguments appended after the script path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory for the child process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Environment variables injected into the child process.
    /// Values are passed through verbatim as strings.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ProcessDescriptor {
    /// Creates a new descriptor with no interpreter, no watch, and an empty environment.
    #[must_use]
    pub fn new(name: String, script: PathBuf) -> Self {
        Self {
            name,
            script,
            interpreter: None,
            watch: false,
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Returns the script path resolved against the configured working directory.
    #[must_use]
    pub fn resolved_script(&self) -> PathBuf {
        match &self.cwd {
            Some(cwd) if self.script.is_relative() => cwd.join(&self.script),
            _ => self.script.clone(),
        }
    }

    /// Checks whether the entry point exists on disk.
    #[must_use]
    pub fn script_exists(&self) -> bool {
        self.resolved_script().is_file()
    }
}

/// Configuration containing all applications to supervise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EcosystemConfig {
    /// List of applications to launch.
    pub apps: Vec<ProcessDescriptor>,
}

impl EcosystemConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates all app descriptors.
    ///
    /// Checks structural invariants (non-empty unique names, non-empty
    /// script paths) and that every entry point exists on disk, so that
    /// a broken descriptor is rejected before any process is launched.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.apps.is_empty() {
            return Err(ValidationError::NoApps);
        }

        let mut seen_names = std::collections::HashSet::new();

        for (index, app) in self.apps.iter().enumerate() {
            if app.name.is_empty() {
                return Err(ValidationError::EmptyName { index });
            }

            if !seen_names.insert(&app.name) {
                return Err(ValidationError::DuplicateName {
                    name: app.name.clone(),
                });
            }

            if app.script.as_os_str().is_empty() {
                return Err(ValidationError::EmptyScript {
                    index,
                    name: app.name.clone(),
                });
            }

            if !app.script_exists() {
                return Err(ValidationError::ScriptNotFound {
                    index,
                    name: app.name.clone(),
                    path: app.resolved_script(),
                });
            }
        }

        Ok(())
    }

    /// Returns detailed validation results for all apps.
    #[must_use]
    pub fn validate_all(&self) -> Vec<Result<(), ValidationError>> {
        let mut results = Vec::new();
        let mut seen_names = std::collections::HashSet::new();

        if self.apps.is_empty() {
            results.push(Err(ValidationError::NoApps));
            return results;
        }

        for (index, app) in self.apps.iter().enumerate() {
            if app.name.is_empty() {
                results.push(Err(ValidationError::EmptyName { index }));
                continue;
            }

            if !seen_names.insert(&app.name) {
                results.push(Err(ValidationError::DuplicateName {
                    name: app.name.clone(),
                }));
                continue;
            }

            if app.script.as_os_str().is_empty() {
                results.push(Err(ValidationError::EmptyScript {
                    index,
                    name: app.name.clone(),
                }));
                continue;
            }

            if !app.script_exists() {
                results.push(Err(ValidationError::ScriptNotFound {
                    index,
                    name: app.name.clone(),
                    path: app.resolved_script(),
                }));
                continue;
            }

            results.push(Ok(()));
        }

        results
    }

    /// Gets an app descriptor by its index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ProcessDescriptor> {
        self.apps.get(index)
    }

    /// Gets an app descriptor by its name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&ProcessDescriptor> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Returns the number of configured apps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Checks if there are no apps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Creates an example configuration for users to reference.
    #[must_use]
    pub fn example() -> Self {
        let mut env = BTreeMap::new();
        env.insert("IMAGE_SIZE".to_owned(), "256".to_owned());
        env.insert("EPOCHS".to_owned(), "500".to_owned());
        env.insert("LR".to_owned(), "0.005".to_owned());
        env.insert("ALPHA".to_owned(), "10".to_owned());
        env.insert("BETA".to_owned(), "60".to_owned());
        env.insert("TG_BOT_TOKEN".to_owned(), String::new());

        let mut app = ProcessDescriptor::new(
            "NST telegram bot".to_owned(),
            PathBuf::from("./app.py"),
        );
        app.interpreter = Some("python".to_owned());
        app.watch = true;
        app.env = env;

        Self { apps: vec![app] }
    }
}
