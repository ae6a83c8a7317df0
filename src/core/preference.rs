//! Which provisioning backend to try first, and whether fallback is allowed.
//!
//! The preference is resolved exactly once at startup, in order of
//! precedence:
//! 1. `--venv` / `--conda` force flags (mutually exclusive)
//! 2. the `ENV_MANAGER` environment variable
//! 3. auto-detection: conda if it is on `PATH`, else venv

use std::fmt;

use crate::util::config::ConfigError;

/// Name of the environment variable carrying the backend hint.
pub const ENV_MANAGER_VAR: &str = "ENV_MANAGER";

/// The two provisioning backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Conda: creates the environment and installs the toolchain into it.
    Managed,
    /// `python -m venv`: creates the environment, only verifies the toolchain.
    Lightweight,
}

impl BackendKind {
    /// The backend a fallback would switch to.
    pub fn other(self) -> BackendKind {
        match self {
            BackendKind::Managed => BackendKind::Lightweight,
            BackendKind::Lightweight => BackendKind::Managed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Managed => "conda",
            BackendKind::Lightweight => "venv",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User hint from `ENV_MANAGER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentPreference {
    Conda,
    Venv,
    #[default]
    Unspecified,
}

impl EnvironmentPreference {
    /// Parse an `ENV_MANAGER` value. Empty means unspecified.
    pub fn from_hint(value: &str) -> Result<Self, ConfigError> {
        match value {
            "conda" => Ok(EnvironmentPreference::Conda),
            "venv" => Ok(EnvironmentPreference::Venv),
            "" => Ok(EnvironmentPreference::Unspecified),
            other => Err(ConfigError::InvalidEnvManager(other.to_string())),
        }
    }

    /// Read the hint from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(ENV_MANAGER_VAR) {
            Ok(value) => Self::from_hint(&value),
            Err(std::env::VarError::NotPresent) => Ok(EnvironmentPreference::Unspecified),
            Err(std::env::VarError::NotUnicode(raw)) => Err(ConfigError::InvalidEnvManager(
                raw.to_string_lossy().into_owned(),
            )),
        }
    }
}

/// How the primary backend was chosen. Immutable once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// `--venv`: venv only, no fallback.
    ForcedVenv,
    /// `--conda`: conda first, fallback to venv permitted.
    ForcedConda,
    /// `ENV_MANAGER` named a backend.
    Hinted(BackendKind),
    /// Nothing was specified; chosen by command discoverability.
    AutoDetected(BackendKind),
}

impl Selection {
    /// Resolve the selection from flags, the env hint and conda's presence.
    ///
    /// The hint is only consulted when no force flag was given, so an invalid
    /// `ENV_MANAGER` is ignored under `--conda`/`--venv`.
    pub fn resolve(
        force_conda: bool,
        force_venv: bool,
        hint: impl FnOnce() -> Result<EnvironmentPreference, ConfigError>,
        conda_discoverable: bool,
    ) -> Result<Selection, ConfigError> {
        if force_venv && force_conda {
            return Err(ConfigError::ConflictingForceFlags);
        }
        if force_venv {
            return Ok(Selection::ForcedVenv);
        }
        if force_conda {
            return Ok(Selection::ForcedConda);
        }

        Ok(match hint()? {
            EnvironmentPreference::Conda => Selection::Hinted(BackendKind::Managed),
            EnvironmentPreference::Venv => Selection::Hinted(BackendKind::Lightweight),
            EnvironmentPreference::Unspecified if conda_discoverable => {
                Selection::AutoDetected(BackendKind::Managed)
            }
            EnvironmentPreference::Unspecified => {
                Selection::AutoDetected(BackendKind::Lightweight)
            }
        })
    }

    /// Backend attempted first.
    pub fn primary(&self) -> BackendKind {
        match self {
            Selection::ForcedVenv => BackendKind::Lightweight,
            Selection::ForcedConda => BackendKind::Managed,
            Selection::Hinted(kind) | Selection::AutoDetected(kind) => *kind,
        }
    }

    /// Whether a failed primary may be followed by one attempt of the other
    /// backend.
    pub fn fallback_allowed(&self) -> bool {
        !matches!(self, Selection::ForcedVenv)
    }

    pub fn describe(&self) -> String {
        match self {
            Selection::ForcedVenv => "venv (forced by --venv, no fallback)".to_string(),
            Selection::ForcedConda => "conda (requested by --conda)".to_string(),
            Selection::Hinted(kind) => format!("{} (from {})", kind, ENV_MANAGER_VAR),
            Selection::AutoDetected(kind) => format!("{} (auto-detected)", kind),
        }
    }
}
