//! conda-managed environments.
//!
//! conda creates a named environment pinned to the requested interpreter
//! and installs the build toolchain into it from a single trusted channel.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::host::ArchFamily;
use crate::core::{BackendKind, Host};
use crate::toolchain::{CMAKE_MIN, COMPILER_MIN, MAKE_MIN, PKG_CONFIG_MIN};
use crate::util::config::Settings;
use crate::util::process::{CommandOutput, CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

use super::{
    run_step, ActivatedEnvironment, ActivationSlot, AttemptFailure, AttemptResult, Backend,
    FailureStage, EXIT_CHECK_FAILED, EXIT_NOT_FOUND,
};

const CONDA: &str = "conda";

/// Prints the prefix of the interpreter that actually runs.
const MARKER_SCRIPT: &str = "import sys; print(sys.prefix)";

#[derive(Debug, Deserialize)]
struct EnvList {
    envs: Vec<PathBuf>,
}

/// conda package specs for the build toolchain on `host`.
///
/// The generic `compilers` metapackage has its own version line, so it
/// carries no compiler floor.
pub fn toolchain_specs(host: &Host) -> Vec<String> {
    let mut specs = vec![
        format!("make>={}", MAKE_MIN),
        format!("cmake>={}", CMAKE_MIN),
        format!("pkg-config>={}", PKG_CONFIG_MIN),
    ];

    let compilers = host.compiler_packages();
    if host.arch_family() == ArchFamily::Other {
        specs.extend(compilers.iter().map(|pkg| pkg.to_string()));
    } else {
        specs.extend(compilers.iter().map(|pkg| format!("{}>={}", pkg, COMPILER_MIN)));
    }

    specs
}

pub struct ManagedBackend<'a> {
    runner: &'a dyn CommandRunner,
    shell: &'a Shell,
    host: Host,
    python: String,
    name: String,
    channel: String,
}

impl<'a> ManagedBackend<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        shell: &'a Shell,
        settings: &Settings,
        host: Host,
    ) -> Self {
        ManagedBackend {
            runner,
            shell,
            host,
            python: settings.python.clone(),
            name: settings.env_name.clone(),
            channel: settings.channel.clone(),
        }
    }

    fn fail(&self, stage: FailureStage, code: i32, detail: impl Into<String>) -> AttemptFailure {
        AttemptFailure::new(BackendKind::Managed, stage, code, detail)
    }

    fn step(
        &self,
        cmd: &ProcessBuilder,
        stage: FailureStage,
    ) -> Result<CommandOutput, AttemptFailure> {
        run_step(self.runner, BackendKind::Managed, cmd, stage)
    }

    fn locate(&self) -> Result<PathBuf, AttemptFailure> {
        self.runner.find_program(CONDA).ok_or_else(|| {
            self.fail(
                FailureStage::CommandNotFound,
                EXIT_NOT_FOUND,
                "`conda` not found on PATH",
            )
        })
    }

    /// The base install must answer and the shell hook must load.
    fn ensure_initialized(&self, conda: &Path) -> Result<PathBuf, AttemptFailure> {
        let base = self.step(
            &ProcessBuilder::new(conda).args(["info", "--base"]),
            FailureStage::NotInitialized,
        )?;
        let base = base.first_line().map(PathBuf::from).ok_or_else(|| {
            self.fail(
                FailureStage::NotInitialized,
                EXIT_CHECK_FAILED,
                "`conda info --base` reported no base environment",
            )
        })?;

        self.step(
            &ProcessBuilder::new(conda).args(["shell.posix", "hook"]),
            FailureStage::NotInitialized,
        )?;

        tracing::debug!("conda base environment at {}", base.display());
        Ok(base)
    }

    fn create(&self, conda: &Path) -> AttemptResult {
        let span = self.shell.span(
            Status::Creating,
            format!("conda environment `{}` (python {})", self.name, self.python),
        );

        let cmd = ProcessBuilder::new(conda)
            .args(["create", "-y", "-n", self.name.as_str()])
            .arg(format!("python={}", self.python));
        match self.step(&cmd, FailureStage::CreationFailed) {
            Ok(_) => {
                span.finish(Status::Created, format!("conda environment `{}`", self.name));
                Ok(())
            }
            Err(failure) => {
                span.finish(Status::Failed, format!("conda environment `{}`", self.name));
                Err(failure)
            }
        }
    }

    fn locate_prefix(&self, conda: &Path) -> Result<PathBuf, AttemptFailure> {
        let output = self.step(
            &ProcessBuilder::new(conda).args(["env", "list", "--json"]),
            FailureStage::ActivationFailed,
        )?;

        let list: EnvList = serde_json::from_str(&output.stdout).map_err(|e| {
            self.fail(
                FailureStage::ActivationFailed,
                EXIT_CHECK_FAILED,
                format!("could not parse `conda env list --json`: {}", e),
            )
        })?;

        list.envs
            .into_iter()
            .find(|prefix| prefix.file_name().is_some_and(|n| n == self.name.as_str()))
            .ok_or_else(|| {
                self.fail(
                    FailureStage::ActivationFailed,
                    EXIT_CHECK_FAILED,
                    format!("environment `{}` not listed by conda", self.name),
                )
            })
    }

    /// Activate and confirm the marker names this environment exactly.
    fn activate(&self, conda: &Path, slot: &mut ActivationSlot) -> Result<PathBuf, AttemptFailure> {
        let prefix = self.locate_prefix(conda)?;
        let env = slot
            .activate(ActivatedEnvironment::conda(&self.name, &prefix))
            .map_err(|e| {
                self.fail(FailureStage::ActivationFailed, EXIT_CHECK_FAILED, e.to_string())
            })?;

        let output = self.step(
            &env.python_command().args(["-c", MARKER_SCRIPT]),
            FailureStage::ActivationFailed,
        )?;

        // The overlay sets CONDA_DEFAULT_ENV itself, so the name is taken
        // from the prefix the interpreter reports.
        let sys_prefix = PathBuf::from(output.first_line().unwrap_or(""));
        let active = sys_prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if active != self.name || sys_prefix != prefix {
            return Err(self.fail(
                FailureStage::ActivationFailed,
                EXIT_CHECK_FAILED,
                format!(
                    "expected active environment `{}` at {}, found `{}` at {}",
                    self.name,
                    prefix.display(),
                    active,
                    sys_prefix.display()
                ),
            ));
        }

        self.shell.status(
            Status::Activated,
            format!("conda environment `{}`", self.name),
        );
        Ok(prefix)
    }

    /// Best-effort: a failing channel setting is only a warning.
    fn configure_channels(&self, conda: &Path, prefix: &Path) {
        let condarc = prefix.join(".condarc");
        let settings: [&[&str]; 2] = [
            &["--add", "channels", self.channel.as_str()],
            &["--set", "channel_priority", "strict"],
        ];

        for setting in settings {
            let cmd = ProcessBuilder::new(conda)
                .arg("config")
                .arg("--file")
                .arg(&condarc)
                .args(setting);
            let result = self.runner.run(&cmd);
            match result {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    tracing::warn!(
                        "`{}` exited with {}: {}",
                        cmd.display_command(),
                        output.code(),
                        output.stderr_summary()
                    );
                    self.shell
                        .warn(format!("could not apply conda setting `{}`", setting.join(" ")));
                }
                Err(e) => {
                    tracing::warn!("`{}` could not run: {:#}", cmd.display_command(), e);
                    self.shell
                        .warn(format!("could not apply conda setting `{}`", setting.join(" ")));
                }
            }
        }
    }

    fn install_toolchain(&self, conda: &Path) -> AttemptResult {
        let specs = toolchain_specs(&self.host);
        let span = self.shell.span(
            Status::Installing,
            format!("build toolchain from {} ({})", self.channel, specs.join(", ")),
        );

        let cmd = ProcessBuilder::new(conda)
            .args([
                "install",
                "-y",
                "-n",
                self.name.as_str(),
                "-c",
                self.channel.as_str(),
                "--override-channels",
            ])
            .args(&specs);
        match self.step(&cmd, FailureStage::ToolchainInstallFailed) {
            Ok(_) => {
                span.finish(Status::Installed, "build toolchain");
                Ok(())
            }
            Err(failure) => {
                span.finish(Status::Failed, "build toolchain");
                Err(failure)
            }
        }
    }
}

impl Backend for ManagedBackend<'_> {
    fn kind(&self) -> BackendKind {
        BackendKind::Managed
    }

    fn is_available(&self) -> bool {
        self.runner.is_discoverable(CONDA)
    }

    fn attempt(&mut self, slot: &mut ActivationSlot) -> AttemptResult {
        let conda = self.locate()?;
        self.ensure_initialized(&conda)?;
        self.create(&conda)?;
        let prefix = self.activate(&conda, slot)?;
        self.configure_channels(&conda, &prefix);
        self.install_toolchain(&conda)
    }
}
