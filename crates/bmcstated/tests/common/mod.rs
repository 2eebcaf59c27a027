//! Fake collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bmcstate_common::{BmcState, BmcStatus, PropertyChange, RebootCause, Transition};
use bmcstated::cause_store::{CauseRecord, CauseStore};
use bmcstated::init::{InitError, JobExecutor, JobMode, UnitStatusProvider};
use bmcstated::store::StateStore;
use bmcstated::uptime::{Clock, UptimeSource};
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

pub const READY_UNIT: &str = "multi-user.target";

/// Unit statuses served from a table; unknown units fail the query
#[derive(Default)]
pub struct FakeUnits {
    statuses: Mutex<HashMap<String, String>>,
    unreachable: Mutex<bool>,
    queries: AtomicUsize,
}

impl FakeUnits {
    pub fn with_status(unit: &str, status: &str) -> Self {
        let units = Self::default();
        units.set(unit, status);
        units
    }

    pub fn unreachable() -> Self {
        let units = Self::default();
        *units.unreachable.lock().unwrap() = true;
        units
    }

    pub fn set(&self, unit: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(unit.to_string(), status.to_string());
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitStatusProvider for FakeUnits {
    async fn unit_status(&self, unit: &str) -> Result<String, InitError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if *self.unreachable.lock().unwrap() {
            return Err(InitError::CommandFailed {
                command: "systemctl show".to_string(),
                stderr: "Failed to connect to bus".to_string(),
            });
        }
        self.statuses
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .ok_or_else(|| InitError::CommandFailed {
                command: format!("systemctl show {}", unit),
                stderr: format!("Unit {} not found.", unit),
            })
    }
}

/// Never answers
pub struct HangingUnits;

#[async_trait]
impl UnitStatusProvider for HangingUnits {
    async fn unit_status(&self, _unit: &str) -> Result<String, InitError> {
        std::future::pending().await
    }
}

/// Records start requests. When given a change receiver it also captures
/// every property change already published at the moment of the call.
#[derive(Default)]
pub struct FakeJobs {
    started: Mutex<Vec<(String, JobMode)>>,
    reject: Mutex<bool>,
    observer: Mutex<Option<broadcast::Receiver<PropertyChange>>>,
    seen_before_start: Mutex<Vec<PropertyChange>>,
}

impl FakeJobs {
    pub fn rejecting() -> Self {
        let jobs = Self::default();
        *jobs.reject.lock().unwrap() = true;
        jobs
    }

    /// Refuse every start from now on
    pub fn start_rejecting(&self) {
        *self.reject.lock().unwrap() = true;
    }

    pub fn observe(&self, rx: broadcast::Receiver<PropertyChange>) {
        *self.observer.lock().unwrap() = Some(rx);
    }

    pub fn started(&self) -> Vec<(String, JobMode)> {
        self.started.lock().unwrap().clone()
    }

    pub fn seen_before_start(&self) -> Vec<PropertyChange> {
        self.seen_before_start.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobExecutor for FakeJobs {
    async fn start_unit(&self, unit: &str, mode: JobMode) -> Result<(), InitError> {
        if let Some(rx) = self.observer.lock().unwrap().as_mut() {
            while let Ok(change) = rx.try_recv() {
                self.seen_before_start.lock().unwrap().push(change);
            }
        }
        if *self.reject.lock().unwrap() {
            return Err(InitError::CommandFailed {
                command: format!("systemctl start {}", unit),
                stderr: format!("Unit {} not found.", unit),
            });
        }
        self.started.lock().unwrap().push((unit.to_string(), mode));
        Ok(())
    }
}

/// In-memory cause store
#[derive(Default)]
pub struct MemoryCauses {
    record: Mutex<Option<CauseRecord>>,
    malformed: Mutex<bool>,
}

impl MemoryCauses {
    pub fn with(cause: RebootCause) -> Self {
        let causes = Self::default();
        *causes.record.lock().unwrap() = Some(CauseRecord::now(cause));
        causes
    }

    pub fn malformed() -> Self {
        let causes = Self::default();
        *causes.malformed.lock().unwrap() = true;
        causes
    }

    pub fn current(&self) -> Option<RebootCause> {
        self.record.lock().unwrap().as_ref().map(|r| r.cause)
    }

    pub fn record(&self) -> Option<CauseRecord> {
        self.record.lock().unwrap().clone()
    }
}

#[async_trait]
impl CauseStore for MemoryCauses {
    async fn take(&self) -> io::Result<Option<CauseRecord>> {
        if std::mem::take(&mut *self.malformed.lock().unwrap()) {
            return Err(io::Error::new(ErrorKind::InvalidData, "expected value at line 1"));
        }
        Ok(self.record.lock().unwrap().take())
    }

    async fn load(&self) -> io::Result<Option<CauseRecord>> {
        Ok(self.record.lock().unwrap().clone())
    }

    async fn store(&self, record: &CauseRecord) -> io::Result<()> {
        *self.record.lock().unwrap() = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> io::Result<()> {
        *self.record.lock().unwrap() = None;
        Ok(())
    }
}

pub struct FixedUptime(pub Option<Duration>);

impl UptimeSource for FixedUptime {
    fn uptime(&self) -> io::Result<Duration> {
        self.0
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "/proc/uptime"))
    }
}

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

pub fn status(state: BmcState, cause: RebootCause) -> BmcStatus {
    BmcStatus {
        current_bmc_state: state,
        requested_bmc_transition: Transition::None,
        last_reboot_time: 1_699_999_880_000,
        last_reboot_cause: cause,
    }
}

pub fn store(state: BmcState) -> StateStore {
    StateStore::new(status(state, RebootCause::Unknown))
}

pub fn drain(rx: &mut broadcast::Receiver<PropertyChange>) -> Vec<PropertyChange> {
    let mut out = Vec::new();
    while let Ok(change) = rx.try_recv() {
        out.push(change);
    }
    out
}
