//! Shared utilities

pub mod config;
pub mod diagnostic;
pub mod logging;
pub mod process;
pub mod shell;

pub use config::{Config, ConfigError, Settings};
pub use diagnostic::Diagnostic;
pub use process::{CommandOutput, CommandRunner, ProcessBuilder, SystemRunner};
pub use shell::Shell;
