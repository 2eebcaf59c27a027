//! Reaction to finished jobs
//!
//! Only jobs on the readiness unit matter. The event's own result is not
//! trusted: the unit is re-queried and the state re-derived from what the
//! init system reports now. Duplicate, late or reordered events therefore
//! converge on the same answer.

use bmcstate_common::BmcState;
use std::time::Duration;
use tracing::{debug, info};

use crate::discovery::query_bmc_state;
use crate::events::JobRemoved;
use crate::init::UnitStatusProvider;
use crate::store::StateStore;

#[derive(Debug, Clone)]
pub struct NotificationHandler {
    ready_unit: String,
    query_timeout: Duration,
}

impl NotificationHandler {
    pub fn new(ready_unit: &str, query_timeout: Duration) -> Self {
        Self {
            ready_unit: ready_unit.to_string(),
            query_timeout,
        }
    }

    pub fn is_relevant(&self, event: &JobRemoved) -> bool {
        event.unit == self.ready_unit
    }

    /// Apply one notification. Returns the re-derived state when the event
    /// concerned the readiness unit.
    pub async fn handle(
        &self,
        store: &mut StateStore,
        units: &dyn UnitStatusProvider,
        event: &JobRemoved,
    ) -> Option<BmcState> {
        if !self.is_relevant(event) {
            debug!("Ignoring job {} on {}", event.id, event.unit);
            return None;
        }

        let state = query_bmc_state(units, &self.ready_unit, self.query_timeout).await;
        let previous = store.current_state();
        if store.set_current_state(state) {
            info!(
                "BMC state {} -> {} (job {} on {} finished: {:?})",
                previous, state, event.id, event.unit, event.result
            );
        }
        Some(state)
    }
}
