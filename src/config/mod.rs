//! Configuration management.
//!
//! Configuration is read from a TOML file and then overridden by `PORTER_*`
//! environment variables.
//!
//! ```toml
//! data_dir = "/var/lib/porter"
//! time_budget_secs = 90
//! failure_policy = "isolate"
//!
//! [[services]]
//! category = "pages"
//! priority = 30
//!
//! [[services]]
//! category = "page-versions"
//! parent = "pages"
//! ```

mod services;

pub use services::{ServiceSpec, default_catalog};

use crate::{Error, Result, SCHEMA_VERSION};
use semver::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wall-clock budget for one invocation of a job.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(90);

/// Default extension of archive files.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "porter.db";

/// What to do when a portable service fails mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the run at the first failing service.
    #[default]
    FailFast,
    /// Record the failure, skip the failed category's descendants and continue.
    Isolate,
}

impl FailurePolicy {
    /// Parses a policy string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "fail-fast" | "failfast" => Some(Self::FailFast),
            "isolate" | "continue" => Some(Self::Isolate),
            _ => None,
        }
    }

    /// Returns the policy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail-fast",
            Self::Isolate => "isolate",
        }
    }
}

/// Main configuration for porter.
#[derive(Debug, Clone)]
pub struct PorterConfig {
    /// Directory holding the job/checkpoint database.
    pub data_dir: PathBuf,
    /// Directory archives are written to and read from.
    pub export_dir: Option<PathBuf>,
    /// Root of the site data moved by the built-in directory services.
    pub site_dir: Option<PathBuf>,
    /// Wall-clock budget per invocation.
    pub time_budget: Duration,
    /// Per-service failure handling.
    pub failure_policy: FailurePolicy,
    /// Schema version of this engine.
    pub schema_version: Version,
    /// Extension appended to archive base names.
    pub archive_extension: String,
    /// Service catalog.
    pub services: Vec<ServiceSpec>,
    /// Whether to install the Prometheus metrics recorder.
    pub metrics_enabled: bool,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Export directory.
    pub export_dir: Option<String>,
    /// Site directory.
    pub site_dir: Option<String>,
    /// Time budget in seconds.
    pub time_budget_secs: Option<u64>,
    /// Failure policy name.
    pub failure_policy: Option<String>,
    /// Engine schema version.
    pub schema_version: Option<String>,
    /// Archive extension.
    pub archive_extension: Option<String>,
    /// Metrics switch.
    pub metrics_enabled: Option<bool>,
    /// Service catalog.
    pub services: Option<Vec<ServiceSpec>>,
}

impl Default for PorterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".porter"),
            export_dir: None,
            site_dir: None,
            time_budget: DEFAULT_TIME_BUDGET,
            failure_policy: FailurePolicy::default(),
            schema_version: engine_schema_version(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            services: default_catalog(),
            metrics_enabled: false,
        }
    }
}

impl PorterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::operation("read_config_file", e))?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/porter/config.toml`.
    /// Falls back to defaults (plus env overrides) when nothing loads.
    #[must_use]
    pub fn load_default() -> Self {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            let candidates = [
                base_dirs.config_dir().join("porter").join("config.toml"),
                base_dirs
                    .home_dir()
                    .join(".config")
                    .join("porter")
                    .join("config.toml"),
            ];
            for path in candidates.iter().filter(|p| p.exists()) {
                match Self::load_from_file(path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    },
                }
            }
        }

        let mut config = Self::default();
        if let Err(e) = config.apply_env_overrides() {
            tracing::warn!(error = %e, "Ignoring invalid environment override");
        }
        config
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.export_dir = file.export_dir.map(PathBuf::from);
        config.site_dir = file.site_dir.map(PathBuf::from);
        if let Some(secs) = file.time_budget_secs {
            config.time_budget = Duration::from_secs(secs);
        }
        if let Some(policy) = file.failure_policy {
            config.failure_policy = parse_policy(&policy)?;
        }
        if let Some(version) = file.schema_version {
            config.schema_version = parse_version(&version)?;
        }
        if let Some(ext) = file.archive_extension {
            config.archive_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(enabled) = file.metrics_enabled {
            config.metrics_enabled = enabled;
        }
        if let Some(services) = file.services {
            config.services = services;
        }

        Ok(config)
    }

    /// Applies `PORTER_*` environment variable overrides.
    ///
    /// Reads:
    /// - `PORTER_DATA_DIR`, `PORTER_EXPORT_DIR`, `PORTER_SITE_DIR`
    /// - `PORTER_TIME_BUDGET_SECS`
    /// - `PORTER_FAILURE_POLICY`
    /// - `PORTER_METRICS_ENABLED`
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an invalid value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("PORTER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PORTER_EXPORT_DIR") {
            self.export_dir = Some(PathBuf::from(dir));
        }
        if let Ok(dir) = std::env::var("PORTER_SITE_DIR") {
            self.site_dir = Some(PathBuf::from(dir));
        }
        if let Ok(secs) = std::env::var("PORTER_TIME_BUDGET_SECS") {
            let secs = secs.parse::<u64>().map_err(|e| {
                Error::InvalidInput(format!("PORTER_TIME_BUDGET_SECS '{secs}': {e}"))
            })?;
            self.time_budget = Duration::from_secs(secs);
        }
        if let Ok(policy) = std::env::var("PORTER_FAILURE_POLICY") {
            self.failure_policy = parse_policy(&policy)?;
        }
        if let Ok(enabled) = std::env::var("PORTER_METRICS_ENABLED") {
            self.metrics_enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Directory archives are written to.
    #[must_use]
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("exports"))
    }

    /// Root of the site data.
    #[must_use]
    pub fn site_dir(&self) -> PathBuf {
        self.site_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("site"))
    }

    /// Path of the job and checkpoint database.
    #[must_use]
    pub fn state_db_path(&self) -> PathBuf {
        self.data_dir.join("porter.db")
    }

    /// Full path of an archive given its base name.
    #[must_use]
    pub fn archive_path(&self, base: &str) -> PathBuf {
        self.export_dir()
            .join(format!("{base}.{}", self.archive_extension))
    }

    /// Creates the data, export and site directories if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.export_dir(), self.site_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::operation("create_directory", format!("{}: {e}", dir.display())))?;
        }
        Ok(())
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the site directory.
    #[must_use]
    pub fn with_site_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.site_dir = Some(path.into());
        self
    }

    /// Sets the time budget.
    #[must_use]
    pub const fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the engine schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: Version) -> Self {
        self.schema_version = version;
        self
    }
}

fn parse_policy(s: &str) -> Result<FailurePolicy> {
    FailurePolicy::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown failure policy '{s}'")))
}

fn parse_version(s: &str) -> Result<Version> {
    Version::parse(s).map_err(|e| Error::InvalidInput(format!("schema version '{s}': {e}")))
}

/// Returns the schema version compiled into this crate.
#[must_use]
pub fn engine_schema_version() -> Version {
    Version::parse(SCHEMA_VERSION).unwrap_or_else(|_| Version::new(1, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PorterConfig::default();
        assert_eq!(config.time_budget, Duration::from_secs(90));
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.schema_version, engine_schema_version());
        assert_eq!(config.export_dir(), PathBuf::from(".porter/exports"));
        assert!(!config.services.is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = PorterConfig::from_toml(
            r#"
            data_dir = "/tmp/p"
            time_budget_secs = 5
            failure_policy = "isolate"
            schema_version = "0.9.0"
            archive_extension = ".db"

            [[services]]
            category = "pages"
            priority = 3

            [[services]]
            category = "page-versions"
            parent = "pages"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/p"));
        assert_eq!(config.time_budget, Duration::from_secs(5));
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert_eq!(config.schema_version, Version::new(0, 9, 0));
        assert_eq!(config.archive_path("export-1"), PathBuf::from("/tmp/p/exports/export-1.db"));
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].parent, "pages");
        assert_eq!(config.services[1].priority, 0);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = PorterConfig::from_toml(r#"failure_policy = "sometimes""#);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(FailurePolicy::parse("FAIL_FAST"), Some(FailurePolicy::FailFast));
        assert_eq!(FailurePolicy::parse("isolate"), Some(FailurePolicy::Isolate));
        assert_eq!(FailurePolicy::parse("nope"), None);
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = PorterConfig::default().with_data_dir(dir.path().join("state"));
        config.ensure_directories().unwrap();
        assert!(config.export_dir().is_dir());
        assert!(config.site_dir().is_dir());
    }
}
