//! mlenv - reproducible CPU-only Python ML environments
//!
//! This crate provides the library behind the `mlenv` binary: backend
//! selection with a single fallback, the conda and venv provisioning
//! backends, host toolchain verification and the post-provision package
//! pipeline.

pub mod backend;
pub mod core;
pub mod ops;
pub mod toolchain;
pub mod util;

/// Test utilities and mocks for mlenv unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted command runner and a spy backend.
#[cfg(test)]
pub mod test_support;

pub use backend::{ActivatedEnvironment, ActivationSlot, Backend, FailureStage};
pub use core::{BackendKind, Host, Selection};
pub use ops::{Orchestrator, ProvisionReport, ProvisioningOutcome};
pub use util::config::Settings;
