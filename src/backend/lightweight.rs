//! Plain `python -m venv` environments.
//!
//! Nothing is installed here beyond the venv itself: the host toolchain is
//! verified and the attempt fails if it is not good enough.

use std::path::{Path, PathBuf};

use crate::core::BackendKind;
use crate::toolchain::{format_report, ToolchainVerifier, REQUIREMENTS};
use crate::util::config::Settings;
use crate::util::process::{CommandOutput, CommandRunner, ProcessBuilder};
use crate::util::shell::{Shell, Status};

use super::{
    run_step, ActivatedEnvironment, ActivationSlot, AttemptFailure, AttemptResult, Backend,
    FailureStage, EXIT_CHECK_FAILED, EXIT_NOT_FOUND,
};

const VERSION_SCRIPT: &str = "import sys; print('%d.%d' % sys.version_info[:2])";

/// Prints `VIRTUAL_ENV` and whether the interpreter runs inside a venv.
const MARKER_SCRIPT: &str =
    "import os, sys; print(os.environ.get('VIRTUAL_ENV', '')); print(sys.prefix != sys.base_prefix)";

pub struct LightweightBackend<'a> {
    runner: &'a dyn CommandRunner,
    shell: &'a Shell,
    python: String,
    venv_dir: PathBuf,
}

impl<'a> LightweightBackend<'a> {
    pub fn new(runner: &'a dyn CommandRunner, shell: &'a Shell, settings: &Settings) -> Self {
        LightweightBackend {
            runner,
            shell,
            python: settings.python.clone(),
            venv_dir: settings.venv_dir.clone(),
        }
    }

    /// Interpreter names probed in order.
    fn candidates(&self) -> [String; 3] {
        [
            format!("python{}", self.python),
            "python3".to_string(),
            "python".to_string(),
        ]
    }

    fn fail(&self, stage: FailureStage, code: i32, detail: impl Into<String>) -> AttemptFailure {
        AttemptFailure::new(BackendKind::Lightweight, stage, code, detail)
    }

    fn step(&self, cmd: &ProcessBuilder, stage: FailureStage) -> Result<CommandOutput, AttemptFailure> {
        run_step(self.runner, BackendKind::Lightweight, cmd, stage)
    }

    fn locate_interpreter(&self) -> Result<PathBuf, AttemptFailure> {
        let candidates = self.candidates();
        candidates
            .iter()
            .find_map(|name| self.runner.find_program(name))
            .ok_or_else(|| {
                self.fail(
                    FailureStage::CommandNotFound,
                    EXIT_NOT_FOUND,
                    format!("none of {} found on PATH", candidates.join(", ")),
                )
            })
    }

    /// A different major.minor is tolerated with a warning.
    fn check_interpreter_version(&self, python: &Path) {
        let cmd = ProcessBuilder::new(python).args(["-c", VERSION_SCRIPT]);
        let found = match self.runner.run(&cmd) {
            Ok(output) if output.success() => output.first_line().map(str::to_string),
            Ok(output) => {
                tracing::debug!("`{}` exited with {}", cmd.display_command(), output.code());
                None
            }
            Err(e) => {
                tracing::debug!("could not query {}: {:#}", python.display(), e);
                None
            }
        };

        match found {
            Some(version) if version == self.python => {
                tracing::debug!("{} is python {}", python.display(), version);
            }
            Some(version) => {
                tracing::warn!(
                    "requested python {} but {} is {}",
                    self.python,
                    python.display(),
                    version
                );
                self.shell.warn(format!(
                    "requested python {}, using {} ({}) instead",
                    self.python,
                    python.display(),
                    version
                ));
            }
            None => self.shell.warn(format!(
                "could not determine the version of {}",
                python.display()
            )),
        }
    }

    fn verify_toolchain(&self) -> AttemptResult {
        self.shell.status(Status::Verifying, "host build toolchain");
        let report = ToolchainVerifier::new(self.runner).verify(&REQUIREMENTS);
        self.shell
            .print_block(&format_report(&report, self.shell.is_verbose()));

        if report.overall_pass() {
            self.shell.status(Status::Passed, "host build toolchain");
            return Ok(());
        }

        let failed = report.failed().join(", ");
        Err(self.fail(
            FailureStage::ToolchainVerifyFailed,
            EXIT_CHECK_FAILED,
            format!("missing or outdated build tools: {}", failed),
        ))
    }

    fn ensure_venv_module(&self, python: &Path) -> AttemptResult {
        self.step(
            &ProcessBuilder::new(python).args(["-m", "venv", "--help"]),
            FailureStage::VenvModuleMissing,
        )?;
        Ok(())
    }

    fn create(&self, python: &Path) -> AttemptResult {
        let span = self.shell.span(
            Status::Creating,
            format!("virtual environment at {}", self.venv_dir.display()),
        );

        let cmd = ProcessBuilder::new(python)
            .args(["-m", "venv"])
            .arg(&self.venv_dir);
        match self.step(&cmd, FailureStage::CreationFailed) {
            Ok(_) => {
                span.finish(
                    Status::Created,
                    format!("virtual environment at {}", self.venv_dir.display()),
                );
                Ok(())
            }
            Err(failure) => {
                span.finish(
                    Status::Failed,
                    format!("virtual environment at {}", self.venv_dir.display()),
                );
                Err(failure)
            }
        }
    }

    fn activate(&self, slot: &mut ActivationSlot) -> AttemptResult {
        let env = slot
            .activate(ActivatedEnvironment::venv(&self.venv_dir))
            .map_err(|e| {
                self.fail(FailureStage::ActivationFailed, EXIT_CHECK_FAILED, e.to_string())
            })?;

        let output = self.step(
            &env.python_command().args(["-c", MARKER_SCRIPT]),
            FailureStage::ActivationFailed,
        )?;

        let mut lines = output.stdout.lines().map(str::trim);
        let virtual_env = lines.next().unwrap_or("");
        let inside = lines.next().unwrap_or("");

        if Path::new(virtual_env) != self.venv_dir.as_path() || inside != "True" {
            return Err(self.fail(
                FailureStage::ActivationFailed,
                EXIT_CHECK_FAILED,
                format!(
                    "interpreter in {} does not report running inside it \
                     (VIRTUAL_ENV=`{}`, in venv: {})",
                    self.venv_dir.display(),
                    virtual_env,
                    inside
                ),
            ));
        }

        self.shell.status(
            Status::Activated,
            format!("virtual environment at {}", self.venv_dir.display()),
        );
        Ok(())
    }
}

impl Backend for LightweightBackend<'_> {
    fn kind(&self) -> BackendKind {
        BackendKind::Lightweight
    }

    fn is_available(&self) -> bool {
        self.candidates()
            .iter()
            .any(|name| self.runner.is_discoverable(name))
    }

    fn attempt(&mut self, slot: &mut ActivationSlot) -> AttemptResult {
        let python = self.locate_interpreter()?;
        self.check_interpreter_version(&python);
        self.verify_toolchain()?;
        self.ensure_venv_module(&python)?;
        self.create(&python)?;
        self.activate(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_work_dir, test_settings, MockProcessOutput, MockRunner};

    const TOOLS: [&str; 5] = ["make", "gcc", "g++", "cmake", "pkg-config"];

    fn healthy_host(python: &str) -> MockRunner {
        let mut runner = MockRunner::new();
        runner
            .programs(&TOOLS)
            .program(python)
            .expect("make --version", MockProcessOutput::success("GNU Make 4.3\n"))
            .expect_prefix("gcc -dump", MockProcessOutput::success("12.2.0\n"))
            .expect_prefix("g++ -dump", MockProcessOutput::success("12.2.0\n"))
            .expect("cmake --version", MockProcessOutput::success("cmake version 3.25.1\n"))
            .expect("pkg-config --version", MockProcessOutput::success("1.8.1\n"))
            .expect_prefix(
                &format!("{} -c import sys; print('%d.%d'", python),
                MockProcessOutput::success("3.11\n"),
            )
            .expect(
                &format!("{} -m venv --help", python),
                MockProcessOutput::success("usage: venv\n"),
            )
            .expect(
                &format!("{} -m venv /work/.venv", python),
                MockProcessOutput::success(""),
            )
            .expect_prefix(
                "/work/.venv/bin/python -c",
                MockProcessOutput::success("/work/.venv\nTrue\n"),
            );
        runner
    }

    fn attempt(runner: &MockRunner, slot: &mut ActivationSlot) -> AttemptResult {
        let shell = Shell::quiet();
        let settings = test_settings(&fake_work_dir());
        LightweightBackend::new(runner, &shell, &settings).attempt(slot)
    }

    #[test]
    fn test_successful_attempt() {
        let runner = healthy_host("python3.11");
        let mut slot = ActivationSlot::new();

        attempt(&runner, &mut slot).unwrap();

        let env = slot.current().unwrap();
        assert_eq!(env.backend(), BackendKind::Lightweight);
        assert_eq!(env.prefix(), Path::new("/work/.venv"));
        let marker_env = runner.call_envs().pop().unwrap();
        assert!(marker_env.contains(&("VIRTUAL_ENV".to_string(), "/work/.venv".to_string())));
    }

    #[test]
    fn test_interpreter_probe_order() {
        let runner = healthy_host("python3");
        let mut slot = ActivationSlot::new();

        attempt(&runner, &mut slot).unwrap();
        assert!(runner.called("python3 -m venv /work/.venv"));
    }

    #[test]
    fn test_no_interpreter() {
        let mut runner = MockRunner::new();
        runner.programs(&TOOLS);
        let mut slot = ActivationSlot::new();

        let failure = attempt(&runner, &mut slot).unwrap_err();

        assert_eq!(failure.stage, FailureStage::CommandNotFound);
        assert_eq!(failure.code, EXIT_NOT_FOUND);
    }

    #[test]
    fn test_version_mismatch_is_lenient() {
        let mut runner = healthy_host("python3");
        runner.expect_before(
            "python3 -c import sys; print('%d.%d' % sys.version_info[:2])",
            MockProcessOutput::success("3.12\n"),
        );
        let mut slot = ActivationSlot::new();

        attempt(&runner, &mut slot).unwrap();
        assert!(slot.is_active());
    }

    #[test]
    fn test_toolchain_failure_stops_before_venv() {
        let mut runner = healthy_host("python3.11");
        runner.expect_before("cmake --version", MockProcessOutput::success("cmake version 3.10.2\n"));
        let mut slot = ActivationSlot::new();

        let failure = attempt(&runner, &mut slot).unwrap_err();

        assert_eq!(failure.stage, FailureStage::ToolchainVerifyFailed);
        assert!(failure.detail.contains("cmake"));
        assert!(!runner.called("-m venv"));
    }

    #[test]
    fn test_missing_venv_module() {
        let mut runner = healthy_host("python3.11");
        runner.expect_before(
            "python3.11 -m venv --help",
            MockProcessOutput::failure(1, "No module named venv\n"),
        );
        let mut slot = ActivationSlot::new();

        let failure = attempt(&runner, &mut slot).unwrap_err();

        assert_eq!(failure.stage, FailureStage::VenvModuleMissing);
        assert!(!runner.called("-m venv /work/.venv"));
    }

    #[test]
    fn test_creation_failure() {
        let mut runner = healthy_host("python3.11");
        runner.expect_before(
            "python3.11 -m venv /work/.venv",
            MockProcessOutput::failure(1, "ensurepip is not available\n"),
        );
        let mut slot = ActivationSlot::new();

        let failure = attempt(&runner, &mut slot).unwrap_err();

        assert_eq!(failure.stage, FailureStage::CreationFailed);
        assert!(!slot.is_active());
    }

    #[test]
    fn test_marker_must_report_inside_venv() {
        let mut runner = MockRunner::new();
        runner
            .programs(&TOOLS)
            .program("python3.11")
            .expect_prefix(
                "/work/.venv/bin/python -c",
                MockProcessOutput::success("/work/.venv\nFalse\n"),
            )
            .expect("pkg-config --version", MockProcessOutput::success("1.8.1\n"))
            .expect_prefix("python3.11 -c", MockProcessOutput::success("3.11\n"))
            .set_default(MockProcessOutput::success("99.0\n"));
        let mut slot = ActivationSlot::new();

        let failure = attempt(&runner, &mut slot).unwrap_err();

        assert_eq!(failure.stage, FailureStage::ActivationFailed);
        assert!(failure.detail.contains("in venv: False"));
    }

    #[test]
    fn test_availability() {
        let shell = Shell::quiet();
        let settings = test_settings(&fake_work_dir());

        let mut runner = MockRunner::new();
        assert!(!LightweightBackend::new(&runner, &shell, &settings).is_available());

        runner.program("python");
        assert!(LightweightBackend::new(&runner, &shell, &settings).is_available());
    }
}
