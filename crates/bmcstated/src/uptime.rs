//! Time bases used to date the last reboot
//!
//! Uptime is monotonic since power-on; the clock is wall-clock epoch time.
//! The reboot instant is their difference.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::time::Duration;

pub trait UptimeSource: Send + Sync {
    fn uptime(&self) -> io::Result<Duration>;
}

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

/// Reads the first field of /proc/uptime
#[derive(Debug, Clone)]
pub struct ProcUptime {
    path: PathBuf,
}

impl ProcUptime {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcUptime {
    fn default() -> Self {
        Self::new("/proc/uptime")
    }
}

impl UptimeSource for ProcUptime {
    fn uptime(&self) -> io::Result<Duration> {
        let content = fs::read_to_string(&self.path)?;
        parse_proc_uptime(&content).ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("unparseable uptime: {:?}", content),
            )
        })
    }
}

/// Parse "12345.67 54321.00" into the first field
pub fn parse_proc_uptime(content: &str) -> Option<Duration> {
    let secs: f64 = content.split_whitespace().next()?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Epoch milliseconds of the last reboot; never underflows
pub fn reboot_time_ms(now_ms: u64, uptime: Duration) -> u64 {
    let uptime_ms = u64::try_from(uptime.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_sub(uptime_ms)
}
