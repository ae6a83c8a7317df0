//! Test utilities and mocks for mlenv unit tests.
//!
//! Everything mlenv does to the host goes through a [`CommandRunner`], so
//! backends and the pipeline are tested against scripted command outputs
//! instead of a real conda or python.
//!
//! # Example
//!
//! ```rust,ignore
//! use mlenv::test_support::{MockProcessOutput, MockRunner};
//!
//! #[test]
//! fn test_example() {
//!     let mut runner = MockRunner::new();
//!     runner
//!         .program("conda")
//!         .expect("conda info --base", MockProcessOutput::success("/opt/conda\n"));
//!
//!     // Hand &runner to a backend...
//! }
//! ```

pub mod fixtures;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::util::process::{CommandOutput, CommandRunner, ProcessBuilder};

pub use fixtures::*;

/// Variables recorded by [`MockRunner::call_envs`].
const OVERLAY_VARS: [&str; 4] = ["PATH", "CONDA_PREFIX", "CONDA_DEFAULT_ENV", "VIRTUAL_ENV"];

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Create an output with both stdout and stderr.
    pub fn with_output(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

impl From<MockProcessOutput> for CommandOutput {
    fn from(output: MockProcessOutput) -> Self {
        CommandOutput {
            status: Some(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Pattern for matching commands in [`MockRunner`].
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    pub pattern: CommandPattern,
    pub output: MockProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    pub used: usize,
}

impl CommandExpectation {
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    /// Limit how many times this expectation may match.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

/// Scripted [`CommandRunner`].
///
/// Programs registered with [`MockRunner::program`] are "on PATH" and
/// resolve to their bare name, so recorded command lines read like
/// `conda create -y -n ml python=3.11`. Expectations are matched in order;
/// the first available match wins. Unmatched commands fall back to the
/// default output, or fail to spawn when there is none.
#[derive(Debug, Default)]
pub struct MockRunner {
    programs: HashSet<String>,
    expectations: Mutex<Vec<CommandExpectation>>,
    calls: Mutex<Vec<String>>,
    envs: Mutex<Vec<Vec<(String, String)>>>,
    default_output: Option<MockProcessOutput>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Make a program discoverable.
    pub fn program(&mut self, name: &str) -> &mut Self {
        self.programs.insert(name.to_string());
        self
    }

    /// Make several programs discoverable.
    pub fn programs(&mut self, names: &[&str]) -> &mut Self {
        for name in names {
            self.program(name);
        }
        self
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&mut self, cmd: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ))
    }

    /// Add an exact expectation that takes priority over earlier ones.
    pub fn expect_before(&mut self, cmd: &str, output: MockProcessOutput) -> &mut Self {
        self.expectations_mut().insert(
            0,
            CommandExpectation::new(CommandPattern::Exact(cmd.to_string()), output),
        );
        self
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&mut self, prefix: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command containing a substring.
    pub fn expect_contains(&mut self, substring: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ))
    }

    /// Add a custom expectation.
    pub fn expect_pattern(&mut self, expectation: CommandExpectation) -> &mut Self {
        self.expectations_mut().push(expectation);
        self
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&mut self, output: MockProcessOutput) -> &mut Self {
        self.default_output = Some(output);
        self
    }

    /// All command lines run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Environment overlays of the commands run so far, in call order.
    pub fn call_envs(&self) -> Vec<Vec<(String, String)>> {
        lock(&self.envs).clone()
    }

    /// Number of calls containing `needle`.
    pub fn count_calls(&self, needle: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.contains(needle)).count()
    }

    /// Whether any call contained `needle`.
    pub fn called(&self, needle: &str) -> bool {
        self.count_calls(needle) > 0
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in lock(&self.expectations).iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    bail!(
                        "expectation {} was used {} times, expected {}",
                        i,
                        exp.used,
                        expected
                    );
                }
            }
        }
        Ok(())
    }

    fn expectations_mut(&mut self) -> &mut Vec<CommandExpectation> {
        match self.expectations.get_mut() {
            Ok(exps) => exps,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CommandRunner for MockRunner {
    fn find_program(&self, name: &str) -> Option<PathBuf> {
        self.programs.contains(name).then(|| PathBuf::from(name))
    }

    fn run(&self, cmd: &ProcessBuilder) -> Result<CommandOutput> {
        let full_cmd = cmd.display_command();
        lock(&self.calls).push(full_cmd.clone());

        let mut env: Vec<(String, String)> = OVERLAY_VARS
            .iter()
            .filter_map(|k| cmd.get_env(k).map(|v| (k.to_string(), v.to_string())))
            .collect();
        env.sort();
        lock(&self.envs).push(env);

        for exp in lock(&self.expectations).iter_mut() {
            if exp.pattern.matches(&full_cmd) && exp.available() {
                exp.used += 1;
                return Ok(exp.output.clone().into());
            }
        }

        if let Some(default) = &self.default_output {
            return Ok(default.clone().into());
        }

        bail!("failed to spawn `{}`: unexpected command", full_cmd)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_matches_in_order() {
        let mut runner = MockRunner::new();
        runner
            .program("gcc")
            .expect_pattern(
                CommandExpectation::new(
                    CommandPattern::StartsWith("gcc".into()),
                    MockProcessOutput::failure(1, "first"),
                )
                .times(1),
            )
            .expect_prefix("gcc", MockProcessOutput::success("second"));

        let cmd = ProcessBuilder::new("gcc").arg("--version");
        assert!(!runner.run(&cmd).unwrap().success());
        assert_eq!(runner.run(&cmd).unwrap().stdout, "second");
        assert_eq!(runner.count_calls("gcc --version"), 2);
        runner.verify().unwrap();
    }

    #[test]
    fn test_mock_runner_unknown_command_fails_to_spawn() {
        let runner = MockRunner::new();
        assert!(runner.run(&ProcessBuilder::new("nope")).is_err());
        assert!(runner.find_program("nope").is_none());
        assert!(runner.called("nope"));
    }

    #[test]
    fn test_mock_runner_records_overlay() {
        let mut runner = MockRunner::new();
        runner.set_default(MockProcessOutput::success(""));

        runner
            .run(&ProcessBuilder::new("python").env("VIRTUAL_ENV", "/w/.venv"))
            .unwrap();

        assert_eq!(
            runner.call_envs()[0],
            vec![("VIRTUAL_ENV".to_string(), "/w/.venv".to_string())]
        );
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = CommandPattern::Regex(r"^pip install torch\w*$".into());
        assert!(pattern.matches("pip install torchvision"));
        assert!(!pattern.matches("pip install numpy"));
    }
}
