//! The process-wide "currently active environment".
//!
//! Shell activation scripts mutate the calling shell. mlenv models the same
//! thing as an overlay of environment variables that is applied to every
//! command run inside the environment, held in a single slot so that at
//! most one environment is ever active.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::BackendKind;
use crate::util::process::ProcessBuilder;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationError {
    #[error("cannot activate `{requested}`: `{active}` is still active")]
    AlreadyActive { active: String, requested: String },
}

/// Handle meaning "commands built from this land inside the environment".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatedEnvironment {
    backend: BackendKind,
    name: String,
    prefix: PathBuf,
    vars: Vec<(String, String)>,
}

impl ActivatedEnvironment {
    /// Activation of a named conda environment living at `prefix`.
    pub fn conda(name: impl Into<String>, prefix: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let prefix = prefix.into();
        let vars = vec![
            ("PATH".to_string(), prepend_path(&prefix.join("bin"))),
            ("CONDA_PREFIX".to_string(), prefix.display().to_string()),
            ("CONDA_DEFAULT_ENV".to_string(), name.clone()),
        ];

        ActivatedEnvironment {
            backend: BackendKind::Managed,
            name,
            prefix,
            vars,
        }
    }

    /// Activation of a virtual environment directory.
    pub fn venv(dir: impl Into<PathBuf>) -> Self {
        let prefix = dir.into();
        let vars = vec![
            ("PATH".to_string(), prepend_path(&prefix.join("bin"))),
            ("VIRTUAL_ENV".to_string(), prefix.display().to_string()),
        ];

        ActivatedEnvironment {
            backend: BackendKind::Lightweight,
            name: prefix.display().to_string(),
            prefix,
            vars,
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Environment name (conda) or directory (venv).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Interpreter inside the environment.
    pub fn python(&self) -> PathBuf {
        self.prefix.join("bin").join("python")
    }

    /// Environment variables that make up the activation.
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    /// Build a command that runs inside the environment.
    pub fn command(&self, program: impl AsRef<Path>) -> ProcessBuilder {
        ProcessBuilder::new(program).envs(&self.vars)
    }

    /// Build a command running the environment's interpreter.
    pub fn python_command(&self) -> ProcessBuilder {
        self.command(self.python())
    }

    /// What the user types to enter this environment later.
    pub fn activate_hint(&self) -> String {
        match self.backend {
            BackendKind::Managed => format!("conda activate {}", self.name),
            BackendKind::Lightweight => {
                format!("source {}", self.prefix.join("bin").join("activate").display())
            }
        }
    }

    /// What the user types to leave it.
    pub fn deactivate_hint(&self) -> &'static str {
        match self.backend {
            BackendKind::Managed => "conda deactivate",
            BackendKind::Lightweight => "deactivate",
        }
    }
}

fn prepend_path(bin: &Path) -> String {
    let mut paths = vec![bin.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths)
        .unwrap_or_else(|_| OsString::from(bin.as_os_str()))
        .to_string_lossy()
        .into_owned()
}

/// Single-slot holder of the active environment.
///
/// Dropping the slot deactivates whatever is still active, so every exit
/// path out of a run (success, failure, early return) ends deactivated.
#[derive(Debug, Default)]
pub struct ActivationSlot {
    active: Option<ActivatedEnvironment>,
}

impl ActivationSlot {
    pub fn new() -> Self {
        ActivationSlot { active: None }
    }

    /// Make `env` the active environment. Refuses if another is active.
    pub fn activate(
        &mut self,
        env: ActivatedEnvironment,
    ) -> Result<&ActivatedEnvironment, ActivationError> {
        if let Some(active) = &self.active {
            return Err(ActivationError::AlreadyActive {
                active: active.name.clone(),
                requested: env.name,
            });
        }

        tracing::info!("activated {} environment `{}`", env.backend, env.name);
        Ok(self.active.insert(env))
    }

    /// Clear the slot, returning what was active.
    pub fn deactivate(&mut self) -> Option<ActivatedEnvironment> {
        let env = self.active.take()?;
        match env.backend {
            BackendKind::Managed => {
                tracing::info!("deactivated conda environment `{}`", env.name)
            }
            // A venv is directory-scoped; nothing to tear down.
            BackendKind::Lightweight => {
                tracing::debug!("dropped venv activation for {}", env.name)
            }
        }
        Some(env)
    }

    pub fn current(&self) -> Option<&ActivatedEnvironment> {
        self.active.as_ref()
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|env| env.backend)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for ActivationSlot {
    fn drop(&mut self) {
        self.deactivate();
    }
}
