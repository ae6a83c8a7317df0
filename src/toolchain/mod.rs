//! Host build toolchain requirements.
//!
//! Packages in the ML stack occasionally build native extensions from
//! source, so the environment needs a working build tool, C and C++
//! compilers, a build-config generator and a package-config resolver.
//!
//! The conda path installs these into the environment; the venv path can
//! only check what the host already has (see [`ToolchainVerifier`]).

mod pkgconfig;
mod verify;

pub use pkgconfig::{classify_provider, Provider};
pub use verify::{format_report, ToolCheck, ToolchainReport, ToolchainVerifier};

use crate::core::version::extract_version;

/// Minimum GNU make version.
pub const MAKE_MIN: &str = "4.2";

/// Minimum gcc / g++ version.
pub const COMPILER_MIN: &str = "9.0";

/// Minimum cmake version.
pub const CMAKE_MIN: &str = "3.16";

/// Minimum version of the modern package-config provider (pkgconf).
pub const PKGCONF_MIN: &str = "1.7.0";

/// Minimum version of the legacy package-config provider (freedesktop pkg-config).
pub const PKG_CONFIG_MIN: &str = "0.29";

/// Pulls a version string out of a tool's output.
pub type VersionExtractor = fn(&str) -> Option<String>;

/// The minimum version a tool must report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Minimum {
    /// A single floor.
    Fixed(&'static str),
    /// Different floors depending on which implementation answers to the
    /// command name.
    ByProvider {
        /// Distinct binary name of the modern implementation.
        modern_command: &'static str,
        modern: &'static str,
        legacy: &'static str,
    },
}

impl Minimum {
    /// Floor to apply once the provider is known.
    pub fn floor_for(&self, provider: Option<Provider>) -> Vec<&'static str> {
        match (self, provider) {
            (Minimum::Fixed(min), _) => vec![*min],
            (Minimum::ByProvider { modern, .. }, Some(Provider::Modern)) => vec![*modern],
            (Minimum::ByProvider { legacy, .. }, Some(Provider::Legacy)) => vec![*legacy],
            // Unidentified provider has to satisfy both.
            (Minimum::ByProvider { modern, legacy, .. }, _) => vec![*modern, *legacy],
        }
    }
}

/// A host tool the environment depends on.
#[derive(Debug, Clone, Copy)]
pub struct ToolRequirement {
    /// Display name.
    pub name: &'static str,
    /// Command looked up on `PATH`.
    pub command: &'static str,
    /// Arguments that make the tool print its version.
    pub version_args: &'static [&'static str],
    pub minimum: Minimum,
    pub extract: VersionExtractor,
}

/// The fixed set of tools checked on the venv path.
pub const REQUIREMENTS: [ToolRequirement; 5] = [
    ToolRequirement {
        name: "make",
        command: "make",
        version_args: &["--version"],
        minimum: Minimum::Fixed(MAKE_MIN),
        extract: extract_version,
    },
    ToolRequirement {
        name: "C compiler",
        command: "gcc",
        version_args: &["-dumpfullversion", "-dumpversion"],
        minimum: Minimum::Fixed(COMPILER_MIN),
        extract: extract_version,
    },
    ToolRequirement {
        name: "C++ compiler",
        command: "g++",
        version_args: &["-dumpfullversion", "-dumpversion"],
        minimum: Minimum::Fixed(COMPILER_MIN),
        extract: extract_version,
    },
    ToolRequirement {
        name: "cmake",
        command: "cmake",
        version_args: &["--version"],
        minimum: Minimum::Fixed(CMAKE_MIN),
        extract: extract_version,
    },
    ToolRequirement {
        name: "pkg-config",
        command: "pkg-config",
        version_args: &["--version"],
        minimum: Minimum::ByProvider {
            modern_command: "pkgconf",
            modern: PKGCONF_MIN,
            legacy: PKG_CONFIG_MIN,
        },
        extract: extract_version,
    },
];
