//! Toolchain verification.
//!
//! Observes and judges the host toolchain; never installs anything.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::core::version::is_at_least;
use crate::util::process::{CommandRunner, ProcessBuilder};

use super::{classify_provider, Minimum, Provider, ToolRequirement};

/// Result of checking a single tool.
#[derive(Debug, Clone)]
pub struct ToolCheck {
    /// Display name of the requirement
    pub name: String,

    /// Resolved binary, if the tool exists
    pub path: Option<PathBuf>,

    /// Version reported by the tool
    pub observed: Option<String>,

    /// Floors the observed version was held to
    pub minimum: Vec<&'static str>,

    /// Identified provider, for dual-provider tools
    pub provider: Option<Provider>,

    /// Whether the tool meets its floor
    pub passed: bool,

    /// Human-readable status message
    pub message: String,
}

impl ToolCheck {
    fn absent(req: &ToolRequirement) -> Self {
        ToolCheck {
            name: req.name.to_string(),
            path: None,
            observed: None,
            minimum: req.minimum.floor_for(None),
            provider: None,
            passed: false,
            message: format!("`{}` not found on PATH", req.command),
        }
    }

    fn judged(
        req: &ToolRequirement,
        path: PathBuf,
        observed: Option<String>,
        provider: Option<Provider>,
    ) -> Self {
        let minimum = req.minimum.floor_for(provider);
        let passed = match observed.as_deref() {
            Some(v) => minimum.iter().all(|floor| is_at_least(v, floor)),
            None => false,
        };

        let floors = minimum.join(" and ");
        let message = match (&observed, passed) {
            (Some(v), true) => format!("{} meets >= {}", v, floors),
            (Some(v), false) => format!("{} is older than required >= {}", v, floors),
            (None, _) => "could not determine version".to_string(),
        };

        ToolCheck {
            name: req.name.to_string(),
            path: Some(path),
            observed,
            minimum,
            provider,
            passed,
            message,
        }
    }
}

/// Aggregate of all tool checks.
#[derive(Debug, Clone, Default)]
pub struct ToolchainReport {
    pub checks: Vec<ToolCheck>,
}

impl ToolchainReport {
    /// Whether every tool passed.
    pub fn overall_pass(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Names of the tools that failed.
    pub fn failed(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Runs version probes for a set of requirements.
pub struct ToolchainVerifier<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ToolchainVerifier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        ToolchainVerifier { runner }
    }

    /// Check every requirement.
    pub fn verify(&self, requirements: &[ToolRequirement]) -> ToolchainReport {
        let checks = requirements
            .iter()
            .map(|req| {
                let check = self.check(req);
                tracing::debug!(
                    "toolchain check {}: observed={:?} minimum={:?} passed={}",
                    check.name,
                    check.observed,
                    check.minimum,
                    check.passed
                );
                check
            })
            .collect();

        ToolchainReport { checks }
    }

    fn check(&self, req: &ToolRequirement) -> ToolCheck {
        match req.minimum {
            Minimum::Fixed(_) => {
                let Some(path) = self.runner.find_program(req.command) else {
                    return ToolCheck::absent(req);
                };
                let observed = self.probe_version(&path, req);
                ToolCheck::judged(req, path, observed, None)
            }
            Minimum::ByProvider { modern_command, .. } => {
                let modern = self.runner.find_program(modern_command);
                // The shared command name is preferred; a lone pkgconf binary
                // is still a usable resolver.
                let Some(path) = self
                    .runner
                    .find_program(req.command)
                    .or_else(|| modern.clone())
                else {
                    return ToolCheck::absent(req);
                };
                let observed = self.probe_version(&path, req);
                let provider = classify_provider(modern.is_some(), observed.as_deref());
                ToolCheck::judged(req, path, observed, Some(provider))
            }
        }
    }

    fn probe_version(&self, path: &Path, req: &ToolRequirement) -> Option<String> {
        let cmd = ProcessBuilder::new(path).args(req.version_args);
        let output = match self.runner.run(&cmd) {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("failed to query {} version: {:#}", req.name, e);
                return None;
            }
        };

        if !output.success() {
            tracing::debug!(
                "`{}` exited with {}",
                cmd.display_command(),
                output.code()
            );
            return None;
        }

        let text = if output.stdout.trim().is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        (req.extract)(text)
    }
}

/// Format the toolchain report for display.
pub fn format_report(report: &ToolchainReport, verbose: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Toolchain:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let observed = check.observed.as_deref().unwrap_or("absent");
        let provider = match check.provider {
            Some(p) => format!(" ({})", p),
            None => String::new(),
        };

        let _ = writeln!(
            output,
            "  {} {:<13} {:<10} >= {}{}",
            status,
            check.name,
            observed,
            check.minimum.join(" & "),
            provider
        );

        if verbose {
            let _ = writeln!(output, "      {}", check.message);
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
        }
    }

    output
}
