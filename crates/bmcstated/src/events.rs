//! systemd job notifications
//!
//! systemd emits `JobRemoved(u id, o job, s unit, s result)` on
//! org.freedesktop.systemd1.Manager whenever a job finishes. We read them
//! from `busctl monitor --json=short`, one JSON message per line, and
//! forward the ones that parse to the manager.

use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::init::{run, InitError};

const SYSTEMD_BUS_NAME: &str = "org.freedesktop.systemd1";
const SYSTEMD_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const JOB_REMOVED: &str = "JobRemoved";
const JOB_REMOVED_SIGNATURE: &str = "uoss";

/// Completion result reported with a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Done,
    Canceled,
    Timeout,
    Failed,
    Dependency,
    Skipped,
    Other(String),
}

impl From<&str> for JobResult {
    fn from(s: &str) -> Self {
        match s {
            "done" => JobResult::Done,
            "canceled" => JobResult::Canceled,
            "timeout" => JobResult::Timeout,
            "failed" => JobResult::Failed,
            "dependency" => JobResult::Dependency,
            "skipped" => JobResult::Skipped,
            other => JobResult::Other(other.to_string()),
        }
    }
}

/// A finished systemd job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRemoved {
    pub id: u32,
    pub job: String,
    pub unit: String,
    pub result: JobResult,
}

#[derive(Deserialize)]
struct BusctlMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    member: Option<String>,
    #[serde(default)]
    payload: Option<BusctlPayload>,
}

#[derive(Deserialize)]
struct BusctlPayload {
    #[serde(rename = "type")]
    signature: String,
    data: (u32, String, String, String),
}

impl JobRemoved {
    pub fn new(id: u32, unit: &str, result: &str) -> Self {
        Self {
            id,
            job: format!("{}/job/{}", SYSTEMD_PATH, id),
            unit: unit.to_string(),
            result: JobResult::from(result),
        }
    }

    /// Parse one `busctl monitor --json=short` line. Anything that is not a
    /// well-formed JobRemoved signal yields None.
    pub fn from_busctl_json(line: &str) -> Option<Self> {
        let msg: BusctlMessage = serde_json::from_str(line).ok()?;
        if msg.kind != "signal"
            || msg.interface.as_deref() != Some(MANAGER_INTERFACE)
            || msg.member.as_deref() != Some(JOB_REMOVED)
        {
            return None;
        }

        let payload = msg.payload?;
        if payload.signature != JOB_REMOVED_SIGNATURE {
            return None;
        }
        let (id, job, unit, result) = payload.data;
        Some(Self {
            id,
            job,
            unit,
            result: JobResult::from(result.as_str()),
        })
    }
}

/// Job notifications via busctl
#[derive(Debug, Clone)]
pub struct BusctlMonitor {
    program: String,
}

impl Default for BusctlMonitor {
    fn default() -> Self {
        Self::new("busctl")
    }
}

impl BusctlMonitor {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Ask systemd to emit job signals to bus clients
    pub async fn subscribe(&self) -> Result<(), InitError> {
        run(
            &self.program,
            &["call", SYSTEMD_BUS_NAME, SYSTEMD_PATH, MANAGER_INTERFACE, "Subscribe"],
        )
        .await?;
        Ok(())
    }

    fn spawn(&self) -> Result<Child, InitError> {
        let rule = format!(
            "type='signal',path='{}',interface='{}',member='{}'",
            SYSTEMD_PATH, MANAGER_INTERFACE, JOB_REMOVED
        );
        Command::new(&self.program)
            .args(["monitor", "--system", "--json=short", "--match", &rule])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InitError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

/// Owned job-notification subscription. Lives until `stop` or drop.
pub struct JobWatcher {
    child: Option<Child>,
    reader: JoinHandle<()>,
}

impl JobWatcher {
    /// Subscribe and start forwarding JobRemoved events to `events`
    pub async fn start(
        monitor: &BusctlMonitor,
        events: mpsc::Sender<JobRemoved>,
    ) -> Result<Self, InitError> {
        monitor.subscribe().await?;
        let mut child = monitor.spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| InitError::CommandFailed {
            command: format!("{} monitor", monitor.program),
            stderr: "stdout not captured".to_string(),
        })?;

        info!("Watching {} {} signals", MANAGER_INTERFACE, JOB_REMOVED);
        let mut watcher = Self::from_reader(stdout, events);
        watcher.child = Some(child);
        Ok(watcher)
    }

    /// Forward events parsed from any line-oriented reader
    pub fn from_reader<R>(reader: R, events: mpsc::Sender<JobRemoved>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let reader = tokio::spawn(forward_lines(reader, events));
        Self { child: None, reader }
    }

    pub async fn stop(mut self) {
        self.reader.abort();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!("Monitor already gone: {}", e);
            }
        }
        info!("Job watcher stopped");
    }
}

impl Drop for JobWatcher {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn forward_lines<R>(reader: R, events: mpsc::Sender<JobRemoved>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match JobRemoved::from_busctl_json(&line) {
                Some(event) => {
                    if events.send(event).await.is_err() {
                        debug!("Event receiver closed");
                        return;
                    }
                }
                None => debug!("Dropping unparseable bus message"),
            },
            Ok(None) => {
                warn!("Job notification stream ended");
                return;
            }
            Err(e) => {
                warn!("Job notification stream failed: {}", e);
                return;
            }
        }
    }
}
