//! Startup discovery
//!
//! Runs once, before the state is published. Every collaborator failure
//! degrades to a documented default instead of failing startup:
//! - unit status unavailable -> NotReady
//! - uptime unreadable       -> LastRebootTime 0
//! - no usable cause record  -> watchdog flags, else Unknown

use bmcstate_common::{BmcState, BmcStatus, RebootCause, Transition};
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cause_store::{cause_from_bootstatus, read_bootstatus, CauseStore};
use crate::init::{InitError, UnitStatusProvider};
use crate::uptime::{reboot_time_ms, Clock, UptimeSource};

/// ActiveState that counts as Ready
pub const ACTIVE_STATUS: &str = "active";

/// Map a unit's reported status to a BMC state.
///
/// Exact match only; anything unrecognized is NotReady.
pub fn bmc_state_from_unit_status(status: &str) -> BmcState {
    match status {
        ACTIVE_STATUS => BmcState::Ready,
        _ => BmcState::NotReady,
    }
}

/// Query `unit` and map the answer, treating failure as NotReady
pub async fn query_bmc_state(
    units: &dyn UnitStatusProvider,
    unit: &str,
    limit: Duration,
) -> BmcState {
    let status = match timeout(limit, units.unit_status(unit)).await {
        Ok(result) => result,
        Err(_) => Err(InitError::Timeout(limit)),
    };

    match status {
        Ok(status) => {
            let state = bmc_state_from_unit_status(&status);
            debug!("{} is {:?} -> {}", unit, status, state);
            state
        }
        Err(e) => {
            warn!("Unit status for {} unavailable, assuming NotReady: {}", unit, e);
            BmcState::NotReady
        }
    }
}

pub struct Discovery<'a> {
    pub units: &'a dyn UnitStatusProvider,
    pub uptime: &'a dyn UptimeSource,
    pub clock: &'a dyn Clock,
    pub causes: &'a dyn CauseStore,
    pub ready_unit: &'a str,
    pub watchdog_bootstatus: Option<&'a Path>,
    pub query_timeout: Duration,
}

impl Discovery<'_> {
    /// Produce the initial value of every property
    pub async fn run(&self) -> BmcStatus {
        let status = BmcStatus {
            current_bmc_state: self.initial_state().await,
            requested_bmc_transition: Transition::None,
            last_reboot_time: self.last_reboot_time(),
            last_reboot_cause: self.last_reboot_cause().await,
        };
        info!(
            "Discovered state={} last_reboot_time={} last_reboot_cause={}",
            status.current_bmc_state, status.last_reboot_time, status.last_reboot_cause
        );
        status
    }

    pub async fn initial_state(&self) -> BmcState {
        query_bmc_state(self.units, self.ready_unit, self.query_timeout).await
    }

    pub fn last_reboot_time(&self) -> u64 {
        match self.uptime.uptime() {
            Ok(uptime) => reboot_time_ms(self.clock.now_ms(), uptime),
            Err(e) => {
                warn!("Uptime unavailable, last reboot time unknown: {}", e);
                0
            }
        }
    }

    pub async fn last_reboot_cause(&self) -> RebootCause {
        match timeout(self.query_timeout, self.causes.take()).await {
            Ok(Ok(Some(record))) => {
                info!("Reboot cause {} recorded at {}", record.cause, record.recorded_at);
                return record.cause;
            }
            Ok(Ok(None)) => debug!("No persisted reboot cause"),
            Ok(Err(e)) => {
                warn!("Persisted reboot cause unusable: {}", e);
                return RebootCause::Unknown;
            }
            Err(_) => {
                warn!("Cause store did not answer within {:?}", self.query_timeout);
                return RebootCause::Unknown;
            }
        }

        self.watchdog_cause().await.unwrap_or(RebootCause::Unknown)
    }

    async fn watchdog_cause(&self) -> Option<RebootCause> {
        let path = self.watchdog_bootstatus?;
        match read_bootstatus(path).await {
            Ok(flags) => {
                debug!("Watchdog bootstatus {:#x}", flags);
                cause_from_bootstatus(flags)
            }
            Err(e) => {
                debug!("No watchdog bootstatus at {}: {}", path.display(), e);
                None
            }
        }
    }
}
