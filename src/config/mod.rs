//! Typed configuration from defaults, an optional TOML file, and environment
//! variables, in that order of precedence (environment wins).
//!
//! Loads once at startup and fails fast on malformed values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::budget::DEFAULT_RESERVED_CORES;
use crate::error::{Error, Result};
use crate::launcher::RelabelCommand;
use crate::mounts::DEFAULT_FS_TYPES;
use crate::preflight::DEFAULT_SELINUXFS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cores left free when sizing the pool.
    pub reserved_cores: usize,
    /// Fixed pool size, replacing the computed budget.
    pub max_jobs: Option<usize>,
    /// Filesystem types that get a relabel job.
    pub fs_types: Vec<String>,
    pub mount_table: PathBuf,
    /// Directory holding one log file per work unit.
    pub log_dir: PathBuf,
    pub selinuxfs: PathBuf,
    pub command: RelabelCommand,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reserved_cores: DEFAULT_RESERVED_CORES,
            max_jobs: None,
            fs_types: DEFAULT_FS_TYPES.iter().map(|t| t.to_string()).collect(),
            mount_table: PathBuf::from("/proc/self/mounts"),
            log_dir: PathBuf::from("/var/log/relabel"),
            selinuxfs: PathBuf::from(DEFAULT_SELINUXFS),
            command: RelabelCommand::default(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

/// On-disk form. Every field is optional and overrides the default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    reserved_cores: Option<usize>,
    max_jobs: Option<usize>,
    fs_types: Option<Vec<String>>,
    mount_table: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    selinuxfs: Option<PathBuf>,
    command: Option<RelabelCommand>,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

impl Config {
    /// Load configuration from environment variables over the defaults.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load defaults, then `path` if given, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file over the defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(content)?;
        let defaults = Self::default();
        Ok(Self {
            reserved_cores: file.reserved_cores.unwrap_or(defaults.reserved_cores),
            max_jobs: file.max_jobs.or(defaults.max_jobs),
            fs_types: file.fs_types.unwrap_or(defaults.fs_types),
            mount_table: file.mount_table.unwrap_or(defaults.mount_table),
            log_dir: file.log_dir.unwrap_or(defaults.log_dir),
            selinuxfs: file.selinuxfs.unwrap_or(defaults.selinuxfs),
            command: file.command.unwrap_or(defaults.command),
            otel_endpoint: file.otel_endpoint.or(defaults.otel_endpoint),
            log_level: file.log_level.unwrap_or(defaults.log_level),
        })
    }

    /// Override fields from variables found by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RELABEL_RESERVED_CORES") {
            self.reserved_cores = parse_count("RELABEL_RESERVED_CORES", &v)?;
        }
        if let Some(v) = lookup("RELABEL_MAX_JOBS") {
            self.max_jobs = Some(parse_count("RELABEL_MAX_JOBS", &v)?);
        }
        if let Some(v) = lookup("RELABEL_FS_TYPES") {
            let types: Vec<String> = v
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            if types.is_empty() {
                return Err(Error::Config(
                    "RELABEL_FS_TYPES must name at least one filesystem type".to_string(),
                ));
            }
            self.fs_types = types;
        }
        if let Some(v) = lookup("RELABEL_MOUNT_TABLE") {
            self.mount_table = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELABEL_LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELABEL_COMMAND") {
            self.command.program = PathBuf::from(v);
        }
        if let Some(v) = lookup("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }
}

fn parse_count(name: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("{name} must be a non-negative integer, got {value:?}"))
    })
}
