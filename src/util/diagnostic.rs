//! User-friendly diagnostic messages.
//!
//! Every fatal message names the root cause, lists what was tried, suggests
//! a fix, and points at the run log.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Conda is missing entirely.
    pub const INSTALL_CONDA: &str =
        "Install Miniconda or Miniforge, then open a new terminal and re-run";

    /// Conda exists but `conda init` was never run.
    pub const INIT_CONDA: &str = "Run `conda init bash` (or your shell), restart the terminal, and re-run";

    /// No usable python interpreter.
    pub const INSTALL_PYTHON: &str =
        "Install Python 3 with your package manager (e.g. `sudo apt install python3 python3-venv`)";

    /// The venv module is missing (Debian/Ubuntu split it out).
    pub const INSTALL_VENV_MODULE: &str =
        "Install the venv module (e.g. `sudo apt install python3-venv`)";

    /// Host build tools are missing or too old.
    pub const INSTALL_BUILD_TOOLS: &str =
        "Install build tools (e.g. `sudo apt install build-essential cmake pkgconf`) or re-run with --conda";

    /// Environment creation failed, often due to network or disk.
    pub const CHECK_NETWORK_AND_DISK: &str =
        "Check your network connection and free disk space, then re-run";

    /// Try the other backend explicitly.
    pub const TRY_VENV: &str = "Re-run with --venv to use a plain virtual environment";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Log file with the full transcript
    pub log_file: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            log_file: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue. Duplicates are dropped.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
        self
    }

    /// Point at the run log.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        for ctx in &self.context {
            output.push_str(&format!("  → {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref log) = self.log_file {
            output.push_str(&format!("\nFull log: {}\n", log.display()));
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("could not provision a Python environment")
            .with_context("conda failed at toolchain-install-failed (exit code 1)")
            .with_context("venv failed at venv-module-missing (exit code 1)")
            .with_suggestion(suggestions::INSTALL_VENV_MODULE)
            .with_log_file("/home/student/mlenv-setup.log");

        let output = diag.format(false);
        assert!(output.contains("error: could not provision"));
        assert!(output.contains("→ conda failed at toolchain-install-failed"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Install the venv module"));
        assert!(output.contains("Full log: /home/student/mlenv-setup.log"));
    }

    #[test]
    fn test_duplicate_suggestions_dropped() {
        let diag = Diagnostic::warning("low disk space")
            .with_suggestion(suggestions::CHECK_NETWORK_AND_DISK)
            .with_suggestion(suggestions::CHECK_NETWORK_AND_DISK);

        assert_eq!(diag.suggestions.len(), 1);
        assert!(diag.to_string().starts_with("warning: low disk space"));
    }
}
