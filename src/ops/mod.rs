//! High-level operations.
//!
//! Each submodule is one phase of a run: preflight checks, provisioning
//! with fallback, package installation and the final summary.

pub mod post_provision;
pub mod preflight;
pub mod provision;
pub mod summary;

pub use post_provision::{PipelineReport, PostProvisionPipeline};
pub use preflight::{check_disk_space, check_host, PreflightError};
pub use provision::{
    AttemptRecord, FallbackDisposition, Orchestrator, ProvisionReport, ProvisioningOutcome,
};
pub use summary::{failure_diagnostic, success_summary};
