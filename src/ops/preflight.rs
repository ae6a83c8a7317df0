//! Checks run before any backend is attempted.

use std::path::Path;

use thiserror::Error;

use crate::core::Host;
use crate::util::process::{CommandRunner, ProcessBuilder};
use crate::util::shell::Shell;

const KIB_PER_GB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightError {
    #[error("unsupported operating system `{0}`; mlenv only provisions Linux hosts")]
    UnsupportedOs(String),
}

/// Refuse to run anywhere but Linux.
pub fn check_host(host: &Host) -> Result<(), PreflightError> {
    if host.is_linux() {
        Ok(())
    } else {
        Err(PreflightError::UnsupportedOs(host.os.clone()))
    }
}

/// Free space on the filesystem holding `dir`, in KiB.
///
/// Returns `None` when `df` is unavailable or its output is not understood.
pub fn free_space_kib(runner: &dyn CommandRunner, dir: &Path) -> Option<u64> {
    let cmd = ProcessBuilder::new("df").arg("-Pk").arg(dir);
    let output = match runner.run(&cmd) {
        Ok(output) if output.success() => output,
        Ok(output) => {
            tracing::debug!("`{}` exited with {}", cmd.display_command(), output.code());
            return None;
        }
        Err(e) => {
            tracing::debug!("could not run df: {:#}", e);
            return None;
        }
    };

    // POSIX format: header, then `fs blocks used available capacity mount`.
    output
        .stdout
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().nth(3))
        .and_then(|avail| avail.parse().ok())
}

/// Warn when less than `min_free_gb` is free. Never fails the run.
pub fn check_disk_space(runner: &dyn CommandRunner, shell: &Shell, dir: &Path, min_free_gb: u64) {
    let Some(free) = free_space_kib(runner, dir) else {
        tracing::debug!("free disk space of {} unknown; continuing", dir.display());
        return;
    };

    let free_gb = free / KIB_PER_GB;
    tracing::debug!("{} GB free in {}", free_gb, dir.display());
    if free < min_free_gb.saturating_mul(KIB_PER_GB) {
        tracing::warn!("only {} GB free, {} GB recommended", free_gb, min_free_gb);
        shell.warn(format!(
            "only {} GB free in {} ({} GB recommended); installs may fail",
            free_gb,
            dir.display(),
            min_free_gb
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockProcessOutput, MockRunner};

    const DF: &str = "Filesystem     1024-blocks      Used Available Capacity Mounted on\n\
                      /dev/nvme0n1p2   491134224 301234000 164882224      65% /\n";

    #[test]
    fn test_check_host() {
        assert!(check_host(&Host::new("linux", "x86_64")).is_ok());
        assert_eq!(
            check_host(&Host::new("macos", "aarch64")),
            Err(PreflightError::UnsupportedOs("macos".into()))
        );
    }

    #[test]
    fn test_free_space_parsing() {
        let mut runner = MockRunner::new();
        runner.expect("df -Pk /work", MockProcessOutput::success(DF));

        assert_eq!(free_space_kib(&runner, Path::new("/work")), Some(164882224));
    }

    #[test]
    fn test_free_space_unknown() {
        let mut runner = MockRunner::new();
        runner.expect("df -Pk /work", MockProcessOutput::success("garbage\n"));
        assert_eq!(free_space_kib(&runner, Path::new("/work")), None);

        let runner = MockRunner::new();
        assert_eq!(free_space_kib(&runner, Path::new("/work")), None);
    }

    #[test]
    fn test_low_disk_space_only_warns() {
        let mut runner = MockRunner::new();
        runner.expect("df -Pk /work", MockProcessOutput::success(DF));

        // 157 GB free against a 500 GB floor: warning, no panic, no error.
        check_disk_space(&runner, &Shell::quiet(), Path::new("/work"), 500);
        assert_eq!(runner.count_calls("df -Pk"), 1);
    }
}
