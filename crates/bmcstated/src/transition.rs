//! Operator-requested transitions
//!
//! A request is accepted once the init system has queued the target unit;
//! completion is observed later through job notifications, never awaited
//! here. For Reboot the cause is recorded before actuation so a reboot that
//! kills this process mid-request is still attributed correctly.

use bmcstate_common::{BmcError, RebootCause, Transition};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cause_store::{CauseRecord, CauseStore};
use crate::init::{InitError, JobExecutor, JobMode};
use crate::store::StateStore;

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Transition {0} cannot be requested")]
    Invalid(Transition),

    #[error("Init system refused {target}: {source}")]
    Rejected {
        target: String,
        #[source]
        source: InitError,
    },
}

impl From<TransitionError> for BmcError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Invalid(t) => {
                BmcError::invalid(bmcstate_common::Property::RequestedBmcTransition, t.as_str())
            }
            TransitionError::Rejected { .. } => BmcError::TransitionRejected(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransitionExecutor {
    reboot_target: String,
    off_target: String,
    job_mode: JobMode,
    actuation_timeout: Duration,
}

impl TransitionExecutor {
    pub fn new(
        reboot_target: &str,
        off_target: &str,
        job_mode: JobMode,
        actuation_timeout: Duration,
    ) -> Self {
        Self {
            reboot_target: reboot_target.to_string(),
            off_target: off_target.to_string(),
            job_mode,
            actuation_timeout,
        }
    }

    /// Unit started for `transition`, if it is actionable
    pub fn target_for(&self, transition: Transition) -> Option<&str> {
        match transition {
            Transition::Reboot => Some(&self.reboot_target),
            Transition::Off => Some(&self.off_target),
            Transition::None => None,
        }
    }

    /// Validate and carry out `value`. On success the accepted value is
    /// returned; on failure the store is left as it was before the call.
    pub async fn request(
        &self,
        store: &mut StateStore,
        jobs: &dyn JobExecutor,
        causes: &dyn CauseStore,
        value: Transition,
    ) -> Result<Transition, TransitionError> {
        let target = self
            .target_for(value)
            .ok_or(TransitionError::Invalid(value))?
            .to_string();

        let prior_transition = store.requested_transition();
        let prior_cause = store.last_reboot_cause();
        // A record left by an earlier accepted reboot must outlive this request
        let mut prior_record = None;

        if value == Transition::Reboot {
            prior_record = match causes.load().await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Existing reboot cause record unreadable: {}", e);
                    None
                }
            };
            store.set_last_reboot_cause(RebootCause::SoftwareRequested);
            if let Err(e) = causes.store(&CauseRecord::now(RebootCause::SoftwareRequested)).await {
                warn!("Failed to persist reboot cause: {}", e);
            }
        }
        store.set_requested_transition(value);

        info!("Requesting {} via {} ({})", value, target, self.job_mode);
        let started = match timeout(
            self.actuation_timeout,
            jobs.start_unit(&target, self.job_mode),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(InitError::Timeout(self.actuation_timeout)),
        };

        if let Err(source) = started {
            warn!("Transition {} rejected: {}", value, source);
            store.set_requested_transition(prior_transition);
            if value == Transition::Reboot {
                store.set_last_reboot_cause(prior_cause);
                restore_record(causes, prior_record.as_ref()).await;
            }
            return Err(TransitionError::Rejected { target, source });
        }

        Ok(value)
    }
}

/// Put the cause record back the way it was before a refused reboot
async fn restore_record(causes: &dyn CauseStore, prior: Option<&CauseRecord>) {
    let restored = match prior {
        Some(record) => causes.store(record).await,
        None => causes.clear().await,
    };
    if let Err(e) = restored {
        warn!("Failed to restore reboot cause record: {}", e);
    }
}
