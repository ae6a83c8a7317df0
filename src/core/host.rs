//! Facts about the machine mlenv is running on.

use std::fmt;

/// Operating system and CPU architecture of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub os: String,
    pub arch: String,
}

/// CPU families with dedicated conda compiler packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchFamily {
    X86_64,
    Aarch64,
    Other,
}

impl Host {
    /// Detect the host from the compile-time target.
    pub fn detect() -> Self {
        Host::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Host {
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn is_linux(&self) -> bool {
        self.os == "linux"
    }

    pub fn arch_family(&self) -> ArchFamily {
        match self.arch.as_str() {
            "x86_64" => ArchFamily::X86_64,
            "aarch64" => ArchFamily::Aarch64,
            _ => ArchFamily::Other,
        }
    }

    /// Conda packages providing the C and C++ compilers for this host.
    ///
    /// Unknown architectures get the generic `compilers` metapackage.
    pub fn compiler_packages(&self) -> &'static [&'static str] {
        match self.arch_family() {
            ArchFamily::X86_64 => &["gcc_linux-64", "gxx_linux-64"],
            ArchFamily::Aarch64 => &["gcc_linux-aarch64", "gxx_linux-aarch64"],
            ArchFamily::Other => &["compilers"],
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.os, self.arch)
    }
}
