//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::loader::ConfigLoader;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Job database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. `~` is expanded.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl DatabaseConfig {
    /// The database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.path))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::home_dir()
        .map(|home| home.join(".cronwarden").join("cronwarden.db"))
        .unwrap_or_else(|| PathBuf::from("cronwarden.db"))
        .to_string_lossy()
        .into_owned()
}

/// Zone cron expressions are evaluated in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimezoneSetting {
    /// The host's local time zone.
    #[default]
    Local,
    /// Coordinated Universal Time.
    Utc,
}

/// Scheduler engine and command execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of commands running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub timezone: TimezoneSetting,

    /// Shell used to interpret job commands.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Flag passing the command text to the shell.
    #[serde(default = "default_shell_flag")]
    pub shell_flag: String,

    /// Working directory for commands. Inherited when unset.
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Kill commands running longer than this. No limit when unset.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
}

impl SchedulerConfig {
    /// The working directory with `~` expanded.
    pub fn resolved_working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .as_deref()
            .map(|dir| PathBuf::from(ConfigLoader::expand_path(dir)))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timezone: TimezoneSetting::default(),
            shell: default_shell(),
            shell_flag: default_shell_flag(),
            working_dir: None,
            command_timeout_secs: None,
        }
    }
}

fn default_max_workers() -> usize {
    20
}

#[cfg(windows)]
fn default_shell() -> String {
    "cmd".to_string()
}

#[cfg(not(windows))]
fn default_shell() -> String {
    "sh".to_string()
}

#[cfg(windows)]
fn default_shell_flag() -> String {
    "/C".to_string()
}

#[cfg(not(windows))]
fn default_shell_flag() -> String {
    "-c".to_string()
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for rolling log files. `~` is expanded.
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Number of daily files kept.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl LoggingConfig {
    /// The log directory with `~` expanded.
    pub fn resolved_dir(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.dir))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: default_log_dir(),
            file_prefix: default_file_prefix(),
            max_files: default_max_files(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "~/.cronwarden/logs".to_string()
}

fn default_file_prefix() -> String {
    "cronwarden".to_string()
}

fn default_max_files() -> usize {
    30
}
