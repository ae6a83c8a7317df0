//! Provisioning backends.
//!
//! A backend turns a bare host into an activated, isolated Python
//! environment. Each attempt is an ordered list of checkpoints; the first
//! checkpoint that fails ends the attempt with an [`AttemptFailure`] naming
//! the [`FailureStage`]. Failures never escape as panics or process exits,
//! so the orchestrator can decide whether to fall back.
//!
//! Two implementations exist:
//! - [`ManagedBackend`]: conda creates the env and installs the toolchain
//! - [`LightweightBackend`]: `python -m venv`, toolchain is only verified

mod activation;
mod lightweight;
mod managed;

pub use activation::{ActivatedEnvironment, ActivationError, ActivationSlot};
pub use lightweight::LightweightBackend;
pub use managed::{toolchain_specs, ManagedBackend};

use std::fmt;

use thiserror::Error;

use crate::core::BackendKind;
use crate::util::process::{CommandOutput, CommandRunner, ProcessBuilder};

/// Exit code reported when a required command does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code reported for checks that are not a single process exit.
pub const EXIT_CHECK_FAILED: i32 = 1;

/// Checkpoint within an attempt at which a backend gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// The backend's command (conda, python) is not on PATH.
    CommandNotFound,
    /// conda has no initialized base environment / activation hook.
    NotInitialized,
    /// Creating the environment exited non-zero.
    CreationFailed,
    /// The environment could not be activated or the marker did not match.
    ActivationFailed,
    /// conda could not install the toolchain packages.
    ToolchainInstallFailed,
    /// The host toolchain is missing or too old (venv path).
    ToolchainVerifyFailed,
    /// The interpreter has no usable `venv` module.
    VenvModuleMissing,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::CommandNotFound => "command-not-found",
            FailureStage::NotInitialized => "not-initialized",
            FailureStage::CreationFailed => "creation-failed",
            FailureStage::ActivationFailed => "activation-failed",
            FailureStage::ToolchainInstallFailed => "toolchain-install-failed",
            FailureStage::ToolchainVerifyFailed => "toolchain-verify-failed",
            FailureStage::VenvModuleMissing => "venv-module-missing",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a backend attempt stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{backend} failed at {stage} (exit code {code}): {detail}")]
pub struct AttemptFailure {
    pub backend: BackendKind,
    pub stage: FailureStage,
    pub code: i32,
    pub detail: String,
}

impl AttemptFailure {
    pub fn new(
        backend: BackendKind,
        stage: FailureStage,
        code: i32,
        detail: impl Into<String>,
    ) -> Self {
        AttemptFailure {
            backend,
            stage,
            code,
            detail: detail.into(),
        }
    }
}

/// Outcome of a single attempt. On success the environment is held by the
/// [`ActivationSlot`] passed to [`Backend::attempt`].
pub type AttemptResult = Result<(), AttemptFailure>;

/// A way of provisioning an isolated environment.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Whether the backend's prerequisite command is discoverable.
    fn is_available(&self) -> bool;

    /// Run every checkpoint in order, stopping at the first failure.
    ///
    /// A backend may leave a partially activated environment in `slot` when
    /// it fails after activation; clearing it is the caller's job.
    fn attempt(&mut self, slot: &mut ActivationSlot) -> AttemptResult;
}

/// Run one checkpoint command, converting every kind of failure into an
/// [`AttemptFailure`] at `stage`.
pub(crate) fn run_step(
    runner: &dyn CommandRunner,
    backend: BackendKind,
    cmd: &ProcessBuilder,
    stage: FailureStage,
) -> Result<CommandOutput, AttemptFailure> {
    let output = runner.run(cmd).map_err(|e| {
        AttemptFailure::new(backend, stage, -1, format!("{:#}", e))
    })?;

    if output.success() {
        Ok(output)
    } else {
        let summary = output.stderr_summary();
        let detail = if summary.is_empty() {
            format!("`{}` failed", cmd.display_command())
        } else {
            format!("`{}` failed: {}", cmd.display_command(), summary)
        };
        Err(AttemptFailure::new(backend, stage, output.code(), detail))
    }
}
