//! mlenv CLI - provision a CPU-only Python ML environment

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mlenv::backend::{ActivationSlot, LightweightBackend, ManagedBackend};
use mlenv::core::{EnvironmentPreference, Host, Selection};
use mlenv::ops::{
    check_disk_space, check_host, failure_diagnostic, success_summary, Orchestrator,
    PostProvisionPipeline,
};
use mlenv::util::config::{global_config_path, load_config, project_config_path, Config, Settings};
use mlenv::util::logging::{open_run_log, DEFAULT_LOG_FILE};
use mlenv::util::{CommandRunner, Shell, SystemRunner};

mod cli;

use cli::Cli;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let work_dir = std::env::current_dir().context("failed to determine the working directory")?;
    let log_path = work_dir.join(
        cli.log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
    );

    // Set up logging
    let log = open_run_log(&log_path)?;
    init_tracing(&cli, log);
    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.no_color);
    tracing::info!(
        "mlenv {} in {}, logging to {}",
        env!("CARGO_PKG_VERSION"),
        work_dir.display(),
        log_path.display()
    );

    let host = Host::detect();
    check_host(&host)?;
    tracing::debug!("host: {}", host);

    let runner = SystemRunner;
    let selection = Selection::resolve(
        cli.conda,
        cli.venv,
        EnvironmentPreference::from_env,
        runner.is_discoverable("conda"),
    )?;

    let settings = Settings::resolve(cli.overrides(), load_merged_config(&work_dir), &work_dir)?;
    tracing::debug!("settings: {:?}", settings);

    check_disk_space(&runner, &shell, &work_dir, settings.min_free_gb);

    // Dropped last, deactivating whatever is still active on every exit path.
    let mut slot = ActivationSlot::new();
    let mut managed = ManagedBackend::new(&runner, &shell, &settings, host);
    let mut lightweight = LightweightBackend::new(&runner, &shell, &settings);
    let report =
        Orchestrator::new(&shell, &mut managed, &mut lightweight).run(&selection, &mut slot);

    let Some(env) = slot.current() else {
        let diagnostic = failure_diagnostic(&report, &log_path);
        shell.print_error_block(&diagnostic.format(shell.use_color()));
        bail!("no environment could be provisioned");
    };

    let pipeline = PostProvisionPipeline::new(&runner, &shell, &settings).run(env);
    shell.print_block(&success_summary(&report, env, &pipeline, &log_path));

    Ok(())
}

fn load_merged_config(work_dir: &Path) -> Config {
    let project = project_config_path(work_dir);
    match global_config_path() {
        Some(global) => load_config(&global, &project),
        None => Config::load_or_default(&project),
    }
}

/// Human-readable events on stderr, the full transcript in the run log.
fn init_tracing(cli: &Cli, log: File) {
    let stderr_filter = if cli.quiet {
        EnvFilter::new("mlenv=error")
    } else if cli.verbose {
        EnvFilter::new("mlenv=debug")
    } else {
        EnvFilter::new("mlenv=info")
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .with_filter(EnvFilter::new("mlenv=debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}
