//! Dotted numeric version comparison.
//!
//! Tool versions are compared component-wise as integers, so `11.5` is
//! newer than `9.9`. Missing trailing components count as zero. Anything
//! that does not parse fails closed: it never satisfies a minimum.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum number of dotted components accepted.
const MAX_COMPONENTS: usize = 4;

static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+){0,3}").expect("static regex"));

/// A parsed `major[.minor[.patch[.build]]]` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DottedVersion {
    parts: [u64; MAX_COMPONENTS],
    len: usize,
}

impl FromStr for DottedVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = [0u64; MAX_COMPONENTS];
        let mut len = 0;

        for component in s.split('.') {
            if len == MAX_COMPONENTS
                || component.is_empty()
                || !component.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(());
            }
            parts[len] = component.parse().map_err(|_| ())?;
            len += 1;
        }

        Ok(DottedVersion { parts, len })
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Unused slots are zero, which gives trailing-zero semantics.
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.parts[..self.len]
            .iter()
            .map(|p| p.to_string())
            .collect();
        f.write_str(&rendered.join("."))
    }
}

/// Parse a version string, returning `None` instead of an error.
pub fn parse_version(s: &str) -> Option<DottedVersion> {
    s.parse().ok()
}

/// Whether `observed` meets `minimum`.
///
/// Returns false when either side cannot be parsed.
pub fn is_at_least(observed: &str, minimum: &str) -> bool {
    match (parse_version(observed), parse_version(minimum)) {
        (Some(observed), Some(minimum)) => observed >= minimum,
        _ => false,
    }
}

/// Pull the first dotted numeric token out of free-form tool output,
/// e.g. `GNU Make 4.3` or `cmake version 3.22.1`.
pub fn extract_version(text: &str) -> Option<String> {
    VERSION_TOKEN
        .find(text)
        .map(|m| m.as_str().to_string())
}
