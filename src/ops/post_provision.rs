//! Package installation inside the activated environment.
//!
//! Runs only after provisioning succeeded. Every step is best-effort: a
//! failure is recorded in the [`PipelineReport`] and shown as a warning,
//! and the remaining steps still run.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::backend::ActivatedEnvironment;
use crate::util::config::Settings;
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

/// Numerical/ML stack installed from the default index.
pub const BASE_PACKAGES: [&str; 7] = [
    "numpy",
    "scipy",
    "pandas",
    "scikit-learn",
    "matplotlib",
    "jupyterlab",
    "ipykernel",
];

/// CPU builds pinned so user requirements cannot replace them.
pub const PROTECTED_PACKAGES: [&str; 3] = ["torch", "torchvision", "torchaudio"];

const IMPORT_CHECK_SCRIPT: &str = "import sys, numpy, torch, torchvision, torchaudio\n\
print(sys.version.split()[0])\n\
print(numpy.__version__)\n\
print(torch.__version__)\n\
print(torchvision.__version__)\n\
print(torchaudio.__version__)\n\
print(torch.cuda.is_available())";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    /// Succeeded on the second try: the default index for a protected
    /// package, the raw manifest for requirements.
    Retried,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
}

/// Versions reported by the final import check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCheck {
    pub python: String,
    pub numpy: String,
    pub torch: String,
    pub torchvision: String,
    pub torchaudio: String,
    pub cuda_available: bool,
}

impl ImportCheck {
    fn parse(stdout: &str) -> Option<ImportCheck> {
        let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        Some(ImportCheck {
            python: lines.next()?.to_string(),
            numpy: lines.next()?.to_string(),
            torch: lines.next()?.to_string(),
            torchvision: lines.next()?.to_string(),
            torchaudio: lines.next()?.to_string(),
            cuda_available: lines.next()? == "True",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub steps: Vec<StepResult>,
    /// `name==version` constraints captured for the protected packages.
    pub pins: Vec<String>,
    pub import_check: Option<ImportCheck>,
}

impl PipelineReport {
    pub fn all_ok(&self) -> bool {
        self.failed_steps().is_empty()
    }

    pub fn failed_steps(&self) -> Vec<&StepResult> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed(_)))
            .collect()
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.name == name)
    }

    fn record(&mut self, name: impl Into<String>, status: StepStatus) {
        self.steps.push(StepResult {
            name: name.into(),
            status,
        });
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Ok => f.write_str("ok"),
            StepStatus::Retried => f.write_str("ok after retry"),
            StepStatus::Failed(why) => write!(f, "failed: {}", why),
            StepStatus::Skipped(why) => write!(f, "skipped: {}", why),
        }
    }
}

pub struct PostProvisionPipeline<'a> {
    runner: &'a dyn CommandRunner,
    shell: &'a Shell,
    cpu_index_url: String,
    requirements: PathBuf,
}

impl<'a> PostProvisionPipeline<'a> {
    pub fn new(runner: &'a dyn CommandRunner, shell: &'a Shell, settings: &Settings) -> Self {
        PostProvisionPipeline {
            runner,
            shell,
            cpu_index_url: settings.cpu_index_url.clone(),
            requirements: settings.requirements.clone(),
        }
    }

    pub fn run(&self, env: &ActivatedEnvironment) -> PipelineReport {
        let mut report = PipelineReport::default();

        let status = self.pip(env, "pip upgrade", &["install", "--upgrade", "pip"]);
        report.record("pip upgrade", status);

        let status = self.pip(env, "pip-tools", &["install", "pip-tools"]);
        report.record("pip-tools", status);

        let mut args = vec!["install"];
        args.extend(BASE_PACKAGES);
        let status = self.pip(env, "base packages", &args);
        report.record("base packages", status);

        for package in PROTECTED_PACKAGES {
            let status = self.install_protected(env, package);
            report.record(package, status);
        }

        report.pins = self.capture_pins(env);

        let constraints = match write_constraints(&report.pins) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("{:#}", e);
                report.record("constraints", StepStatus::Failed(format!("{:#}", e)));
                None
            }
        };

        let status = match &constraints {
            Some(file) => self.install_requirements(env, file.path()),
            None => StepStatus::Skipped("no constraints file".to_string()),
        };
        report.record("requirements", status);

        report.import_check = self.import_check(env);
        match &report.import_check {
            Some(_) => report.record("import check", StepStatus::Ok),
            None => report.record(
                "import check",
                StepStatus::Failed("numpy/torch stack import failed".to_string()),
            ),
        }

        for step in report.failed_steps() {
            self.shell.warn(format!("{} {}", step.name, step.status));
        }

        report
    }

    fn pip(&self, env: &ActivatedEnvironment, what: &str, args: &[&str]) -> StepStatus {
        let span = self.shell.span(Status::Installing, what);
        let cmd = env.python_command().args(["-m", "pip"]).args(args);
        let status = self.outcome(&cmd);
        match &status {
            StepStatus::Ok => span.finish(Status::Installed, what),
            _ => span.finish(Status::Failed, what),
        }
        status
    }

    fn outcome(&self, cmd: &ProcessBuilder) -> StepStatus {
        match self.runner.run(cmd) {
            Ok(output) if output.success() => StepStatus::Ok,
            Ok(output) => {
                tracing::warn!(
                    "`{}` exited with {}",
                    cmd.display_command(),
                    output.code()
                );
                StepStatus::Failed(format!(
                    "exit code {}: {}",
                    output.code(),
                    output.stderr_summary()
                ))
            }
            Err(e) => StepStatus::Failed(format!("{:#}", e)),
        }
    }

    /// CPU index first, then once more from the default index.
    fn install_protected(&self, env: &ActivatedEnvironment, package: &str) -> StepStatus {
        let status = self.pip(
            env,
            package,
            &["install", package, "--index-url", self.cpu_index_url.as_str()],
        );
        if status == StepStatus::Ok {
            return status;
        }

        self.shell.status(
            Status::Fallback,
            format!("{} from the default package index", package),
        );
        match self.pip(env, package, &["install", package]) {
            StepStatus::Ok => StepStatus::Retried,
            failed => failed,
        }
    }

    fn capture_pins(&self, env: &ActivatedEnvironment) -> Vec<String> {
        let packages = PROTECTED_PACKAGES
            .iter()
            .map(|p| format!("'{}'", p))
            .collect::<Vec<_>>()
            .join(", ");
        let script = format!(
            "import importlib.metadata as m\n\
             for p in ({}):\n    \
             try:\n        print(p + '==' + m.version(p))\n    \
             except m.PackageNotFoundError:\n        pass",
            packages
        );

        let cmd = env.python_command().args(["-c", script.as_str()]);
        match self.runner.run(&cmd) {
            Ok(output) if output.success() => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| l.contains("=="))
                .map(str::to_string)
                .collect(),
            Ok(output) => {
                tracing::warn!("could not read installed versions: {}", output.stderr_summary());
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("could not read installed versions: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Lock and install the user's requirements under the captured pins.
    fn install_requirements(&self, env: &ActivatedEnvironment, constraints: &Path) -> StepStatus {
        if !self.requirements.is_file() {
            tracing::debug!("no requirements file at {}", self.requirements.display());
            return StepStatus::Skipped(format!("{} not found", self.requirements.display()));
        }

        let lock = match lock_file() {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::warn!("{:#}", e);
                None
            }
        };

        let compiled = lock.as_ref().is_some_and(|lock| {
            let cmd = env
                .python_command()
                .args(["-m", "piptools", "compile", "--quiet", "--constraint"])
                .arg(constraints)
                .arg("--output-file")
                .arg(lock.path())
                .arg(&self.requirements);
            self.outcome(&cmd) == StepStatus::Ok
        });

        let span = self.shell.span(
            Status::Installing,
            format!("requirements from {}", self.requirements.display()),
        );
        let status = match (&lock, compiled) {
            (Some(lock), true) => match self.pip_constrained(env, lock.path(), constraints) {
                StepStatus::Ok => StepStatus::Ok,
                failed => {
                    tracing::warn!("locked install failed ({}); retrying unresolved", failed);
                    self.shell.warn(format!(
                        "locked install of {} failed; installing it unresolved",
                        self.requirements.display()
                    ));
                    match self.pip_constrained(env, &self.requirements, constraints) {
                        StepStatus::Ok => StepStatus::Retried,
                        failed => failed,
                    }
                }
            },
            _ => {
                self.shell.warn(format!(
                    "could not lock {}; installing it unresolved",
                    self.requirements.display()
                ));
                self.pip_constrained(env, &self.requirements, constraints)
            }
        };

        match &status {
            StepStatus::Failed(_) => span.finish(Status::Failed, "requirements"),
            _ => span.finish(Status::Installed, "requirements"),
        }
        status
    }

    /// `pip install -r <source> -c <constraints>`.
    fn pip_constrained(
        &self,
        env: &ActivatedEnvironment,
        source: &Path,
        constraints: &Path,
    ) -> StepStatus {
        let cmd = env
            .python_command()
            .args(["-m", "pip", "install", "-r"])
            .arg(source)
            .arg("-c")
            .arg(constraints);
        self.outcome(&cmd)
    }

    fn import_check(&self, env: &ActivatedEnvironment) -> Option<ImportCheck> {
        self.shell.status(Status::Verifying, "numpy and torch stack imports");
        let cmd = env.python_command().args(["-c", IMPORT_CHECK_SCRIPT]);
        match self.runner.run(&cmd) {
            Ok(output) if output.success() => ImportCheck::parse(&output.stdout),
            Ok(output) => {
                tracing::warn!("import check failed: {}", output.stderr_summary());
                None
            }
            Err(e) => {
                tracing::warn!("import check could not run: {:#}", e);
                None
            }
        }
    }
}

fn write_constraints(pins: &[String]) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("mlenv-constraints-")
        .suffix(".txt")
        .tempfile()
        .context("failed to create constraints file")?;
    for pin in pins {
        writeln!(file, "{}", pin).context("failed to write constraints file")?;
    }
    file.flush().context("failed to write constraints file")?;
    tracing::debug!("constraints in {}: {:?}", file.path().display(), pins);
    Ok(file)
}

fn lock_file() -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("mlenv-lock-")
        .suffix(".txt")
        .tempfile()
        .context("failed to create lock file")
}
