//! Core data structures for mlenv.
//!
//! - Host facts (operating system, architecture)
//! - Dotted version comparison
//! - Backend preference and selection

pub mod host;
pub mod preference;
pub mod version;

pub use host::Host;
pub use preference::{BackendKind, EnvironmentPreference, Selection};
pub use version::{is_at_least, DottedVersion};
