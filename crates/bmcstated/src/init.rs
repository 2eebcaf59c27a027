//! Init system access
//!
//! Two narrow capabilities are needed from systemd:
//! - read a unit's ActiveState (`systemctl show`)
//! - enqueue a start job without waiting for it (`systemctl start --no-block`)
//!
//! Both sit behind traits so the state engine can run against fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Init system did not answer within {0:?}")]
    Timeout(Duration),
}

/// systemd job mode for start requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobMode {
    Replace,
    Fail,
    Isolate,
    ReplaceIrreversibly,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Replace => "replace",
            JobMode::Fail => "fail",
            JobMode::Isolate => "isolate",
            JobMode::ReplaceIrreversibly => "replace-irreversibly",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source of unit status strings
#[async_trait]
pub trait UnitStatusProvider: Send + Sync {
    /// Raw ActiveState reported for `unit` (e.g. "active", "activating")
    async fn unit_status(&self, unit: &str) -> Result<String, InitError>;
}

/// Starts units on behalf of a transition request
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Enqueue a start job for `unit`. Returns once the init system accepted
    /// or refused the job, never after the job ran.
    async fn start_unit(&self, unit: &str, mode: JobMode) -> Result<(), InitError>;
}

/// systemctl-backed implementation of both init traits
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: String,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new("systemctl")
    }
}

impl Systemctl {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

#[async_trait]
impl UnitStatusProvider for Systemctl {
    async fn unit_status(&self, unit: &str) -> Result<String, InitError> {
        let stdout = run(
            &self.program,
            &["show", unit, "--property=ActiveState", "--value"],
        )
        .await?;
        // Only the line terminator is stripped; the mapping is exact.
        Ok(stdout.trim_end_matches('\n').to_string())
    }
}

#[async_trait]
impl JobExecutor for Systemctl {
    async fn start_unit(&self, unit: &str, mode: JobMode) -> Result<(), InitError> {
        let job_mode = format!("--job-mode={}", mode);
        run(&self.program, &["start", "--no-block", &job_mode, unit]).await?;
        Ok(())
    }
}

/// Run a command to completion and return its stdout
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String, InitError> {
    debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| InitError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(InitError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
