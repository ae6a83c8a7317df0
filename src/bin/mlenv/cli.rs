//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

use mlenv::util::config::CliOverrides;

/// mlenv - set up a CPU-only Python ML environment with conda or venv
///
/// Uses conda when it is installed, otherwise a plain venv, and falls back
/// to the other one once if the first attempt fails. ENV_MANAGER=conda|venv
/// picks the first backend when no flag does.
#[derive(Parser, Debug)]
#[command(name = "mlenv")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Prefer conda (fallback to venv still allowed)
    #[arg(long, conflicts_with = "venv")]
    pub conda: bool,

    /// Use a plain venv only (no fallback)
    #[arg(long)]
    pub venv: bool,

    /// Python version as MAJOR.MINOR [default: 3.11]
    #[arg(long, value_name = "X.Y")]
    pub python: Option<String>,

    /// conda environment name [default: ml]
    #[arg(long, value_name = "ENV_NAME")]
    pub name: Option<String>,

    /// venv directory [default: .venv]
    #[arg(long, value_name = "PATH")]
    pub venv_dir: Option<PathBuf>,

    /// Extra dependencies to install under the pinned torch stack [default: requirements.txt]
    #[arg(long, value_name = "PATH")]
    pub requirements: Option<PathBuf>,

    /// Where to write the run log [default: mlenv-setup.log]
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            python: self.python.clone(),
            name: self.name.clone(),
            venv_dir: self.venv_dir.clone(),
            requirements: self.requirements.clone(),
        }
    }
}
