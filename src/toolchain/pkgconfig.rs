//! Package-config resolver provider identification.
//!
//! Two implementations answer to `pkg-config`: pkgconf (the modern one,
//! usually also installed as `pkgconf`) and the legacy freedesktop
//! pkg-config. They are versioned independently (pkgconf is 1.x/2.x,
//! freedesktop stopped at 0.29.x), so the floor depends on which one is
//! present.

use std::fmt;

use crate::core::version::{is_at_least, parse_version};

/// Version at which the reported number implies pkgconf.
const MODERN_VERSION_THRESHOLD: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// pkgconf.
    Modern,
    /// freedesktop pkg-config.
    Legacy,
    /// Could not be determined from the binary name or the version output.
    Unknown,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Modern => f.write_str("pkgconf"),
            Provider::Legacy => f.write_str("freedesktop pkg-config"),
            Provider::Unknown => f.write_str("unknown provider"),
        }
    }
}

/// Identify the provider.
///
/// A discoverable `pkgconf` binary settles it. Otherwise the reported
/// version decides: 1.0.0 and above can only be pkgconf.
pub fn classify_provider(modern_binary_present: bool, observed: Option<&str>) -> Provider {
    if modern_binary_present {
        return Provider::Modern;
    }

    match observed.filter(|v| parse_version(v).is_some()) {
        Some(v) if is_at_least(v, MODERN_VERSION_THRESHOLD) => Provider::Modern,
        Some(_) => Provider::Legacy,
        None => Provider::Unknown,
    }
}
