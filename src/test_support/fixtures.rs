//! Test fixtures for common test scenarios.
//!
//! Scripted backends for orchestrator tests and ready-made settings for
//! backend and pipeline tests.

use std::path::{Path, PathBuf};

use crate::backend::{
    ActivatedEnvironment, ActivationSlot, AttemptFailure, AttemptResult, Backend, FailureStage,
    EXIT_CHECK_FAILED,
};
use crate::core::BackendKind;
use crate::util::config::{
    Settings, DEFAULT_CHANNEL, DEFAULT_CPU_INDEX_URL, DEFAULT_ENV_NAME, DEFAULT_MIN_FREE_GB,
    DEFAULT_PYTHON,
};

/// What a [`FakeBackend`] does when attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Activate an environment and succeed.
    Succeed,
    /// Fail at the stage without touching the slot.
    FailAt(FailureStage),
    /// Activate an environment, then fail at the stage.
    FailAfterActivation(FailureStage),
}

/// Spy backend with scripted behavior.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    kind: BackendKind,
    available: bool,
    behavior: FakeBehavior,
    /// Number of times `attempt` was called.
    pub attempts: usize,
}

impl FakeBackend {
    pub fn new(kind: BackendKind, behavior: FakeBehavior) -> Self {
        FakeBackend {
            kind,
            available: true,
            behavior,
            attempts: 0,
        }
    }

    /// A backend whose command is not discoverable.
    pub fn unavailable(kind: BackendKind) -> Self {
        FakeBackend {
            available: false,
            ..FakeBackend::new(kind, FakeBehavior::FailAt(FailureStage::CommandNotFound))
        }
    }

    fn environment(&self) -> ActivatedEnvironment {
        match self.kind {
            BackendKind::Managed => ActivatedEnvironment::conda("ml", "/opt/conda/envs/ml"),
            BackendKind::Lightweight => ActivatedEnvironment::venv("/work/.venv"),
        }
    }

    fn failure(&self, stage: FailureStage) -> AttemptFailure {
        AttemptFailure::new(self.kind, stage, EXIT_CHECK_FAILED, "scripted failure")
    }

    fn activate(&self, slot: &mut ActivationSlot) -> AttemptResult {
        slot.activate(self.environment()).map_err(|e| {
            AttemptFailure::new(
                self.kind,
                FailureStage::ActivationFailed,
                EXIT_CHECK_FAILED,
                e.to_string(),
            )
        })?;
        Ok(())
    }
}

impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn attempt(&mut self, slot: &mut ActivationSlot) -> AttemptResult {
        self.attempts += 1;
        match self.behavior {
            FakeBehavior::Succeed => self.activate(slot),
            FakeBehavior::FailAt(stage) => Err(self.failure(stage)),
            FakeBehavior::FailAfterActivation(stage) => {
                self.activate(slot)?;
                Err(self.failure(stage))
            }
        }
    }
}

/// Default settings rooted at `work_dir`.
pub fn test_settings(work_dir: &Path) -> Settings {
    Settings {
        python: DEFAULT_PYTHON.to_string(),
        env_name: DEFAULT_ENV_NAME.to_string(),
        venv_dir: work_dir.join(".venv"),
        channel: DEFAULT_CHANNEL.to_string(),
        cpu_index_url: DEFAULT_CPU_INDEX_URL.to_string(),
        requirements: work_dir.join("requirements.txt"),
        min_free_gb: DEFAULT_MIN_FREE_GB,
    }
}

/// Working directory used by tests that never touch the filesystem.
pub fn fake_work_dir() -> PathBuf {
    PathBuf::from("/work")
}
