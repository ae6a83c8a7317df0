//! Configuration file support for mlenv.
//!
//! mlenv supports two configuration file locations:
//! - Global: `~/.mlenv/config.toml` - User-wide defaults
//! - Project: `.mlenv/config.toml` - Classroom or project overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default interpreter version pinned for new environments.
pub const DEFAULT_PYTHON: &str = "3.11";

/// Default conda environment name.
pub const DEFAULT_ENV_NAME: &str = "ml";

/// Default virtual environment directory.
pub const DEFAULT_VENV_DIR: &str = ".venv";

/// Default trusted conda channel.
pub const DEFAULT_CHANNEL: &str = "conda-forge";

/// Package index serving CPU-only builds of the protected packages.
pub const DEFAULT_CPU_INDEX_URL: &str = "https://download.pytorch.org/whl/cpu";

/// Default user dependency manifest.
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";

/// Free space below which a warning is printed, in GiB.
pub const DEFAULT_MIN_FREE_GB: u64 = 10;

static PYTHON_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+$").expect("static regex"));

/// Fatal configuration problems. Each maps to exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid ENV_MANAGER value `{0}` (expected `conda`, `venv`, or empty)")]
    InvalidEnvManager(String),

    #[error("--conda and --venv cannot be used together")]
    ConflictingForceFlags,

    #[error("invalid python version `{0}` (expected MAJOR.MINOR, e.g. 3.11)")]
    InvalidPythonVersion(String),

    #[error("invalid package index URL `{url}`: {reason}")]
    InvalidIndexUrl { url: String, reason: String },

    #[error("environment name must not be empty")]
    EmptyEnvName,
}

/// mlenv configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment settings
    pub environment: EnvironmentConfig,

    /// Conda settings
    pub conda: CondaConfig,

    /// Package installation settings
    pub packages: PackagesConfig,

    /// Pre-flight check settings
    pub preflight: PreflightConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Interpreter version (MAJOR.MINOR)
    pub python: Option<String>,

    /// Conda environment name
    pub name: Option<String>,

    /// Virtual environment directory
    pub venv_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CondaConfig {
    /// Trusted channel for toolchain packages
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Index serving CPU-only wheels for the protected packages
    pub cpu_index_url: Option<String>,

    /// User dependency manifest
    pub requirements: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Minimum free disk space in GiB
    pub min_free_gb: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.environment.python.is_some() {
            self.environment.python = other.environment.python;
        }
        if other.environment.name.is_some() {
            self.environment.name = other.environment.name;
        }
        if other.environment.venv_dir.is_some() {
            self.environment.venv_dir = other.environment.venv_dir;
        }

        if other.conda.channel.is_some() {
            self.conda.channel = other.conda.channel;
        }

        if other.packages.cpu_index_url.is_some() {
            self.packages.cpu_index_url = other.packages.cpu_index_url;
        }
        if other.packages.requirements.is_some() {
            self.packages.requirements = other.packages.requirements;
        }

        if other.preflight.min_free_gb.is_some() {
            self.preflight.min_free_gb = other.preflight.min_free_gb;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.mlenv/config.toml)
/// 2. Global config (~/.mlenv/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global mlenv config directory (~/.mlenv).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".mlenv"))
}

/// Get the global config path (~/.mlenv/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.mlenv/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".mlenv").join("config.toml")
}

/// Command-line values that override the config files.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub python: Option<String>,
    pub name: Option<String>,
    pub venv_dir: Option<PathBuf>,
    pub requirements: Option<PathBuf>,
}

/// Fully resolved, validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub python: String,
    pub env_name: String,
    /// Absolute venv directory.
    pub venv_dir: PathBuf,
    pub channel: String,
    pub cpu_index_url: String,
    /// Absolute path of the user dependency manifest (may not exist).
    pub requirements: PathBuf,
    pub min_free_gb: u64,
}

impl Settings {
    /// Combine CLI overrides with the merged config and validate the result.
    ///
    /// Relative paths are resolved against `work_dir`.
    pub fn resolve(
        cli: CliOverrides,
        config: Config,
        work_dir: &Path,
    ) -> std::result::Result<Settings, ConfigError> {
        let python = cli
            .python
            .or(config.environment.python)
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string());
        validate_python_version(&python)?;

        let env_name = cli
            .name
            .or(config.environment.name)
            .unwrap_or_else(|| DEFAULT_ENV_NAME.to_string());
        if env_name.trim().is_empty() {
            return Err(ConfigError::EmptyEnvName);
        }

        let venv_dir = cli
            .venv_dir
            .or(config.environment.venv_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VENV_DIR));

        let requirements = cli
            .requirements
            .or(config.packages.requirements)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REQUIREMENTS));

        let cpu_index_url = config
            .packages
            .cpu_index_url
            .unwrap_or_else(|| DEFAULT_CPU_INDEX_URL.to_string());
        validate_index_url(&cpu_index_url)?;

        Ok(Settings {
            python,
            env_name,
            venv_dir: work_dir.join(venv_dir),
            channel: config
                .conda
                .channel
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            cpu_index_url,
            requirements: work_dir.join(requirements),
            min_free_gb: config.preflight.min_free_gb.unwrap_or(DEFAULT_MIN_FREE_GB),
        })
    }
}

/// Check that a version is of the form `MAJOR.MINOR`.
pub fn validate_python_version(version: &str) -> std::result::Result<(), ConfigError> {
    if PYTHON_VERSION.is_match(version) {
        Ok(())
    } else {
        Err(ConfigError::InvalidPythonVersion(version.to_string()))
    }
}

fn validate_index_url(raw: &str) -> std::result::Result<(), ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidIndexUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidIndexUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{}`", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.environment.python.is_none());
        assert!(config.conda.channel.is_none());
        assert!(config.preflight.min_free_gb.is_none());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[environment]
python = "3.10"
name = "cs229"

[conda]
channel = "defaults"

[preflight]
min_free_gb = 4
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.environment.python, Some("3.10".to_string()));
        assert_eq!(config.environment.name, Some("cs229".to_string()));
        assert_eq!(config.conda.channel, Some("defaults".to_string()));
        assert_eq!(config.preflight.min_free_gb, Some(4));
    }

    #[test]
    fn test_unparseable_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[environment\npython = ").unwrap();

        let config = Config::load_or_default(&config_path);
        assert!(config.environment.python.is_none());
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join("project.toml");

        std::fs::write(
            &global_path,
            r#"
[environment]
python = "3.10"
name = "global-env"
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[environment]
name = "course-env"
"#,
        )
        .unwrap();

        let config = load_config(&global_path, &project_path);

        assert_eq!(config.environment.name, Some("course-env".to_string()));
        assert_eq!(config.environment.python, Some("3.10".to_string()));
    }

    #[test]
    fn test_settings_defaults() {
        let work = PathBuf::from("/home/student/course");
        let settings =
            Settings::resolve(CliOverrides::default(), Config::default(), &work).unwrap();

        assert_eq!(settings.python, DEFAULT_PYTHON);
        assert_eq!(settings.env_name, DEFAULT_ENV_NAME);
        assert_eq!(settings.venv_dir, work.join(".venv"));
        assert_eq!(settings.requirements, work.join("requirements.txt"));
        assert_eq!(settings.channel, DEFAULT_CHANNEL);
        assert_eq!(settings.min_free_gb, DEFAULT_MIN_FREE_GB);
    }

    #[test]
    fn test_cli_overrides_config() {
        let mut config = Config::default();
        config.environment.python = Some("3.9".to_string());
        config.environment.venv_dir = Some(PathBuf::from("env"));

        let cli = CliOverrides {
            python: Some("3.12".to_string()),
            venv_dir: Some(PathBuf::from("/opt/venvs/ml")),
            ..Default::default()
        };

        let settings = Settings::resolve(cli, config, Path::new("/work")).unwrap();
        assert_eq!(settings.python, "3.12");
        // Absolute paths are kept as-is by join.
        assert_eq!(settings.venv_dir, PathBuf::from("/opt/venvs/ml"));
    }

    #[test]
    fn test_invalid_python_version() {
        for bad in ["3", "3.11.2", "three.eleven", "", "3.x"] {
            let cli = CliOverrides {
                python: Some(bad.to_string()),
                ..Default::default()
            };
            let err = Settings::resolve(cli, Config::default(), Path::new("/w")).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidPythonVersion(_)), "{}", bad);
        }
    }

    #[test]
    fn test_invalid_index_url() {
        let mut config = Config::default();
        config.packages.cpu_index_url = Some("ftp://mirror.example/whl".to_string());

        let err = Settings::resolve(CliOverrides::default(), config, Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIndexUrl { .. }));
    }

    #[test]
    fn test_empty_env_name_rejected() {
        let cli = CliOverrides {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        let err = Settings::resolve(cli, Config::default(), Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyEnvName));
    }
}
