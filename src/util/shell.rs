//! Centralized shell output and progress management.
//!
//! The Shell module provides a unified API for all user-facing output:
//! - Status messages with consistent formatting
//! - Spinners for long blocking steps (via indicatif)
//! - Scoped timing spans
//!
//! Diagnostics go to stderr. The run log is handled separately by tracing,
//! so anything printed here should also be logged by the caller when it
//! matters after the terminal scrolls away.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no spinners
    Quiet,
    /// Default: status messages + spinners
    #[default]
    Normal,
    /// --verbose: status lines and debug logs, no spinners
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    /// Always use ANSI colors.
    Always,
    /// Never use ANSI colors.
    Never,
}

/// Status types for output messages.
///
/// Shell handles all formatting - callers just specify the semantic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Activated,
    Created,
    Finished,
    Installed,
    Passed,

    // In-progress statuses (cyan)
    Checking,
    Creating,
    Installing,
    Trying,
    Verifying,

    // Info statuses (blue/default)
    Info,

    // Warning statuses (yellow)
    Fallback,
    Skipped,
    Warning,

    // Error statuses (red)
    Failed,
    Error,
}

impl Status {
    /// Get the display text for this status.
    fn as_str(&self) -> &'static str {
        match self {
            Status::Activated => "Activated",
            Status::Created => "Created",
            Status::Finished => "Finished",
            Status::Installed => "Installed",
            Status::Passed => "Passed",
            Status::Checking => "Checking",
            Status::Creating => "Creating",
            Status::Installing => "Installing",
            Status::Trying => "Trying",
            Status::Verifying => "Verifying",
            Status::Info => "Info",
            Status::Fallback => "Fallback",
            Status::Skipped => "Skipped",
            Status::Warning => "Warning",
            Status::Failed => "Failed",
            Status::Error => "error",
        }
    }

    /// Get the ANSI color code for this status.
    fn color_code(&self) -> &'static str {
        match self {
            Status::Activated
            | Status::Created
            | Status::Finished
            | Status::Installed
            | Status::Passed => "\x1b[1;32m",
            Status::Checking
            | Status::Creating
            | Status::Installing
            | Status::Trying
            | Status::Verifying => "\x1b[1;36m",
            Status::Info => "\x1b[1;34m",
            Status::Fallback | Status::Skipped | Status::Warning => "\x1b[1;33m",
            Status::Failed | Status::Error => "\x1b[1;31m",
        }
    }

    /// Get the width for alignment (12 characters).
    fn width(&self) -> usize {
        12
    }
}

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
}

impl Shell {
    /// Create a new shell.
    pub fn new(verbosity: Verbosity, color: ColorChoice) -> Self {
        let use_color = match color {
            ColorChoice::Auto => io::stderr().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };

        Shell {
            verbosity,
            use_color,
        }
    }

    /// Create a shell from CLI flags. Quiet wins over verbose.
    pub fn from_flags(quiet: bool, verbose: bool, no_color: bool) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };
        let color = if no_color {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };

        Shell::new(verbosity, color)
    }

    /// A shell that prints nothing but errors; used by tests.
    pub fn quiet() -> Self {
        Shell::new(Verbosity::Quiet, ColorChoice::Never)
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`
    ///
    /// In quiet mode, only Error and Failed statuses are printed.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && !matches!(status, Status::Error | Status::Failed) {
            return;
        }

        let prefix = self.format_status(status);
        eprintln!("{} {}", prefix, msg);
    }

    /// Print an info message.
    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: impl Display) {
        self.status(Status::Error, msg);
    }

    /// Print a raw block of text (summaries, cheat sheets) to stdout.
    pub fn print_block(&self, text: &str) {
        if !self.is_quiet() {
            print!("{}", text);
        }
    }

    /// Print a raw block of text to stderr even in quiet mode.
    pub fn print_error_block(&self, text: &str) {
        eprint!("{}", text);
    }

    /// Format a status prefix with optional color.
    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        let width = status.width();

        if self.use_color {
            let color = status.color_code();
            format!("{}{:>width$}\x1b[0m", color, text, width = width)
        } else {
            format!("{:>width$}", text, width = width)
        }
    }

    /// Create a scoped span for timing a long step.
    ///
    /// The start line is printed immediately; a spinner runs until the span
    /// is finished or dropped (normal verbosity on a terminal only).
    pub fn span(&self, status: Status, msg: impl Display) -> Span<'_> {
        Span::new(self, status, msg.to_string())
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal, ColorChoice::Auto)
    }
}

/// A scoped timing span with an optional spinner.
pub struct Span<'a> {
    shell: &'a Shell,
    message: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    finished: bool,
}

impl<'a> Span<'a> {
    fn new(shell: &'a Shell, status: Status, message: String) -> Self {
        let spinner = if shell.verbosity == Verbosity::Normal && io::stderr().is_terminal() {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {msg} ({elapsed})")
            {
                pb.set_style(style);
            }
            pb.set_message(format!("{} {}", status.as_str(), message));
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            shell.status(status, &message);
            None
        };

        Span {
            shell,
            message,
            start: Instant::now(),
            spinner,
            finished: false,
        }
    }

    /// Finish the span, printing the outcome with its duration.
    pub fn finish(mut self, status: Status, msg: impl Display) {
        self.finished = true;
        self.clear_spinner();
        let duration = format_duration(self.start.elapsed());
        self.shell.status(status, format!("{} in {}", msg, duration));
    }

    fn clear_spinner(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.clear_spinner();
        let duration = format_duration(self.start.elapsed());
        self.shell
            .status(Status::Finished, format!("{} in {}", self.message, duration));
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}
