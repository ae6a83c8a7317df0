//! End-of-run output: the success summary with its cheat sheet, and the
//! failure diagnostic.

use std::fmt::Write;
use std::path::Path;

use crate::backend::{ActivatedEnvironment, AttemptFailure, FailureStage};
use crate::core::BackendKind;
use crate::util::diagnostic::{suggestions, Diagnostic};

use super::post_provision::PipelineReport;
use super::provision::{FallbackDisposition, ProvisionReport, ProvisioningOutcome};

/// Summary printed after a successful run.
pub fn success_summary(
    provision: &ProvisionReport,
    env: &ActivatedEnvironment,
    pipeline: &PipelineReport,
    log_file: &Path,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "Environment ready");
    let _ = writeln!(out, "  Backend:     {}", env.backend());
    let _ = writeln!(out, "  Location:    {}", env.prefix().display());
    if let ProvisioningOutcome::Succeeded {
        fallback_used: true,
        ..
    } = provision.outcome
    {
        let failed = provision
            .failures()
            .map(|f| format!("{} at {}", f.backend, f.stage))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "  Fallback:    yes ({} failed)", failed);
    }

    match &pipeline.import_check {
        Some(check) => {
            let _ = writeln!(out, "  Python:      {}", check.python);
            let _ = writeln!(out, "  numpy:       {}", check.numpy);
            let _ = writeln!(out, "  torch:       {}", check.torch);
            let _ = writeln!(out, "  torchvision: {}", check.torchvision);
            let _ = writeln!(out, "  torchaudio:  {}", check.torchaudio);
            if check.cuda_available {
                let _ = writeln!(
                    out,
                    "  warning: torch reports CUDA available; a CPU-only build was expected"
                );
            }
        }
        None => {
            let _ = writeln!(out, "  Packages:    import check failed; see the log");
        }
    }

    let failed = pipeline.failed_steps();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Some package steps failed:");
        for step in failed {
            let _ = writeln!(out, "  - {}: {}", step.name, step.status);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Cheat sheet:");
    let _ = writeln!(out, "  activate:    {}", env.activate_hint());
    let _ = writeln!(out, "  deactivate:  {}", env.deactivate_hint());
    let _ = writeln!(out, "  install:     python -m pip install <package>");
    let _ = writeln!(out, "  notebook:    jupyter lab");
    if env.backend() == BackendKind::Managed {
        let _ = writeln!(out, "  remove:      conda env remove -n {}", env.name());
    } else {
        let _ = writeln!(out, "  remove:      rm -rf {}", env.prefix().display());
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Log: {}", log_file.display());

    out
}

/// Fix-it suggestions for the stage an attempt stopped at.
pub fn stage_suggestions(failure: &AttemptFailure) -> &'static [&'static str] {
    match (failure.backend, failure.stage) {
        (BackendKind::Managed, FailureStage::CommandNotFound) => {
            &[suggestions::INSTALL_CONDA, suggestions::TRY_VENV]
        }
        (BackendKind::Lightweight, FailureStage::CommandNotFound) => {
            &[suggestions::INSTALL_PYTHON]
        }
        (_, FailureStage::NotInitialized) => &[suggestions::INIT_CONDA, suggestions::TRY_VENV],
        (_, FailureStage::CreationFailed) | (_, FailureStage::ToolchainInstallFailed) => {
            &[suggestions::CHECK_NETWORK_AND_DISK]
        }
        (_, FailureStage::ActivationFailed) => &[suggestions::INIT_CONDA],
        (_, FailureStage::ToolchainVerifyFailed) => &[suggestions::INSTALL_BUILD_TOOLS],
        (_, FailureStage::VenvModuleMissing) => &[suggestions::INSTALL_VENV_MODULE],
    }
}

/// Diagnostic for a run in which no backend succeeded.
pub fn failure_diagnostic(report: &ProvisionReport, log_file: &Path) -> Diagnostic {
    let message = match &report.outcome {
        ProvisioningOutcome::Failed { fallback, .. } => match fallback {
            FallbackDisposition::Disabled => "environment setup failed (fallback disabled by --venv)",
            FallbackDisposition::Unavailable => {
                "environment setup failed and no other backend is available"
            }
            FallbackDisposition::Exhausted => "environment setup failed with both conda and venv",
        },
        ProvisioningOutcome::Succeeded { .. } => "environment setup reported failure",
    };

    let mut diagnostic = Diagnostic::error(message).with_log_file(log_file);
    for failure in report.failures() {
        diagnostic = diagnostic.with_context(format!(
            "{} failed at {} (exit code {}): {}",
            failure.backend, failure.stage, failure.code, failure.detail
        ));
        for suggestion in stage_suggestions(failure) {
            diagnostic = diagnostic.with_suggestion(*suggestion);
        }
    }

    diagnostic
}
