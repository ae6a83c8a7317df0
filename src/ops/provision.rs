//! Backend selection and fallback.
//!
//! The orchestrator attempts the selected primary backend and, when that
//! fails and the selection allows it, makes exactly one attempt with the
//! other backend. There is never a third attempt and a backend is never
//! retried against itself.
//!
//! | Primary selection      | Fallback on failure                         |
//! |------------------------|---------------------------------------------|
//! | `--venv`               | none, failure is terminal                   |
//! | `--conda`              | venv, if an interpreter is discoverable     |
//! | hinted/auto conda      | venv, if an interpreter is discoverable     |
//! | hinted/auto venv       | conda, if `conda` is discoverable           |
//!
//! The activation slot is cleared before the fallback attempt and after a
//! terminal failure, so a half-activated environment from a failed attempt
//! is never mistaken for the next one.

use std::time::{Duration, Instant};

use crate::backend::{ActivationSlot, AttemptFailure, Backend, FailureStage, EXIT_CHECK_FAILED};
use crate::core::{BackendKind, Selection};
use crate::util::shell::{format_duration, Shell, Status};

/// Why no fallback rescued a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDisposition {
    /// The selection forbids fallback (`--venv`).
    Disabled,
    /// The other backend's command is not discoverable.
    Unavailable,
    /// The fallback was attempted and failed too.
    Exhausted,
}

/// Terminal result of provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOutcome {
    Succeeded {
        backend: BackendKind,
        fallback_used: bool,
    },
    Failed {
        last_failure: AttemptFailure,
        fallback: FallbackDisposition,
    },
}

/// One backend attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub backend: BackendKind,
    /// `None` when the attempt succeeded.
    pub failure: Option<AttemptFailure>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub outcome: ProvisioningOutcome,
    /// Attempts in order; never more than two.
    pub attempts: Vec<AttemptRecord>,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ProvisioningOutcome::Succeeded { .. })
    }

    /// Failures of every attempt, in order.
    pub fn failures(&self) -> impl Iterator<Item = &AttemptFailure> {
        self.attempts.iter().filter_map(|a| a.failure.as_ref())
    }

    /// Number of attempts made with `backend`.
    pub fn attempts_with(&self, backend: BackendKind) -> usize {
        self.attempts.iter().filter(|a| a.backend == backend).count()
    }
}

/// Drives the primary attempt and the single optional fallback.
pub struct Orchestrator<'a> {
    shell: &'a Shell,
    managed: &'a mut dyn Backend,
    lightweight: &'a mut dyn Backend,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        shell: &'a Shell,
        managed: &'a mut dyn Backend,
        lightweight: &'a mut dyn Backend,
    ) -> Self {
        Orchestrator {
            shell,
            managed,
            lightweight,
        }
    }

    fn backend(&mut self, kind: BackendKind) -> &mut dyn Backend {
        match kind {
            BackendKind::Managed => &mut *self.managed,
            BackendKind::Lightweight => &mut *self.lightweight,
        }
    }

    /// Provision an environment according to `selection`.
    ///
    /// On success `slot` holds exactly the winning backend's environment;
    /// on failure it is empty.
    pub fn run(&mut self, selection: &Selection, slot: &mut ActivationSlot) -> ProvisionReport {
        let mut attempts = Vec::with_capacity(2);
        let primary = selection.primary();
        tracing::info!("selected {}", selection.describe());
        self.shell.status(Status::Trying, selection.describe());

        let failure = match self.attempt(primary, slot, &mut attempts) {
            Ok(()) => {
                return ProvisionReport {
                    outcome: ProvisioningOutcome::Succeeded {
                        backend: primary,
                        fallback_used: false,
                    },
                    attempts,
                }
            }
            Err(failure) => failure,
        };
        slot.deactivate();

        let secondary = primary.other();
        let disposition = if !selection.fallback_allowed() {
            Some(FallbackDisposition::Disabled)
        } else if !self.backend(secondary).is_available() {
            Some(FallbackDisposition::Unavailable)
        } else {
            None
        };
        if let Some(fallback) = disposition {
            tracing::info!("no fallback from {}: {:?}", primary, fallback);
            return ProvisionReport {
                outcome: ProvisioningOutcome::Failed {
                    last_failure: failure,
                    fallback,
                },
                attempts,
            };
        }

        self.shell.status(
            Status::Fallback,
            format!("{} failed at {}; falling back to {}", primary, failure.stage, secondary),
        );

        let outcome = match self.attempt(secondary, slot, &mut attempts) {
            Ok(()) => ProvisioningOutcome::Succeeded {
                backend: secondary,
                fallback_used: true,
            },
            Err(last_failure) => {
                slot.deactivate();
                ProvisioningOutcome::Failed {
                    last_failure,
                    fallback: FallbackDisposition::Exhausted,
                }
            }
        };

        ProvisionReport { outcome, attempts }
    }

    fn attempt(
        &mut self,
        kind: BackendKind,
        slot: &mut ActivationSlot,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Result<(), AttemptFailure> {
        tracing::info!("attempting {} backend", kind);
        let start = Instant::now();

        let result = self.backend(kind).attempt(slot).and_then(|()| {
            // A successful attempt must leave its own environment active.
            match slot.active_backend() {
                Some(active) if active == kind => Ok(()),
                other => Err(AttemptFailure::new(
                    kind,
                    FailureStage::ActivationFailed,
                    EXIT_CHECK_FAILED,
                    format!("backend reported success but active environment is {:?}", other),
                )),
            }
        });

        let duration = start.elapsed();
        match &result {
            Ok(()) => tracing::info!("{} succeeded in {}", kind, format_duration(duration)),
            Err(failure) => {
                tracing::warn!("{}", failure);
                self.shell.status(
                    Status::Failed,
                    format!("{} at {}: {}", kind, failure.stage, failure.detail),
                );
            }
        }

        attempts.push(AttemptRecord {
            backend: kind,
            failure: result.as_ref().err().cloned(),
            duration,
        });
        result
    }
}
