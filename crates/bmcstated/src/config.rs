//! Configuration management for bmcstated.
//!
//! Loads settings from /etc/bmcstate/config.toml or uses defaults.
//! Every field has a default so a partial file is always valid.

use anyhow::{Context, Result};
use bmcstate_common::ipc::DEFAULT_SOCKET_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::init::JobMode;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/bmcstate/config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Unit whose `active` state means the BMC is Ready
    #[serde(default = "default_ready_unit")]
    pub ready_unit: String,

    /// Unit started for a Reboot transition
    #[serde(default = "default_reboot_target")]
    pub reboot_target: String,

    /// Unit started for an Off transition
    #[serde(default = "default_off_target")]
    pub off_target: String,

    /// systemd job mode used for transitions
    #[serde(default = "default_job_mode")]
    pub job_mode: JobMode,

    /// Daemon socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Persisted reboot-cause record
    #[serde(default = "default_cause_store_path")]
    pub cause_store_path: PathBuf,

    /// Watchdog boot status flags, consulted when no record was persisted
    #[serde(default = "default_watchdog_bootstatus_path")]
    pub watchdog_bootstatus_path: Option<PathBuf>,

    #[serde(default = "default_uptime_path")]
    pub uptime_path: PathBuf,

    /// Upper bound for any single init-system or cause-store query
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// tracing filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ready_unit() -> String {
    "multi-user.target".to_string()
}

fn default_reboot_target() -> String {
    "reboot.target".to_string()
}

fn default_off_target() -> String {
    "poweroff.target".to_string()
}

fn default_job_mode() -> JobMode {
    JobMode::ReplaceIrreversibly
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_cause_store_path() -> PathBuf {
    PathBuf::from("/var/lib/bmcstate/last-reboot-cause.json")
}

fn default_watchdog_bootstatus_path() -> Option<PathBuf> {
    Some(PathBuf::from("/sys/class/watchdog/watchdog0/bootstatus"))
}

fn default_uptime_path() -> PathBuf {
    PathBuf::from("/proc/uptime")
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ready_unit: default_ready_unit(),
            reboot_target: default_reboot_target(),
            off_target: default_off_target(),
            job_mode: default_job_mode(),
            socket_path: default_socket_path(),
            cause_store_path: default_cause_store_path(),
            watchdog_bootstatus_path: default_watchdog_bootstatus_path(),
            uptime_path: default_uptime_path(),
            query_timeout_ms: default_query_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from `path`. A missing file yields defaults; a file that
    /// exists but does not parse is an error.
    /// Read the config file. `Ok(None)` when it does not exist; the caller
    /// falls back to defaults once logging is up to report it.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .map(Some)
                .with_context(|| format!("Invalid config file {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
