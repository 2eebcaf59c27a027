//! In-memory state of the four published properties.
//!
//! The store is owned by exactly one task (the manager). Setters return
//! whether the value changed; a change notification is broadcast only on an
//! actual change, never for a no-op write.

use bmcstate_common::{
    BmcError, BmcState, BmcStatus, Property, PropertyChange, PropertyValue, RebootCause,
    Transition,
};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered change notifications per subscriber
const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct StateStore {
    current: BmcState,
    requested: Transition,
    last_reboot_time: u64,
    last_reboot_cause: RebootCause,
    seq: u64,
    changes: broadcast::Sender<PropertyChange>,
}

impl StateStore {
    /// Create the store from discovered values. LastRebootTime is fixed here
    /// for the lifetime of the store.
    pub fn new(initial: BmcStatus) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            current: initial.current_bmc_state,
            requested: initial.requested_bmc_transition,
            last_reboot_time: initial.last_reboot_time,
            last_reboot_cause: initial.last_reboot_cause,
            seq: 0,
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PropertyChange> {
        self.changes.subscribe()
    }

    /// Sender half, for handing out further subscriptions from other tasks
    pub fn change_sender(&self) -> broadcast::Sender<PropertyChange> {
        self.changes.clone()
    }

    pub fn current_state(&self) -> BmcState {
        self.current
    }

    pub fn requested_transition(&self) -> Transition {
        self.requested
    }

    pub fn last_reboot_time(&self) -> u64 {
        self.last_reboot_time
    }

    pub fn last_reboot_cause(&self) -> RebootCause {
        self.last_reboot_cause
    }

    pub fn snapshot(&self) -> BmcStatus {
        BmcStatus {
            current_bmc_state: self.current,
            requested_bmc_transition: self.requested,
            last_reboot_time: self.last_reboot_time,
            last_reboot_cause: self.last_reboot_cause,
        }
    }

    pub fn get(&self, property: Property) -> PropertyValue {
        self.snapshot().get(property)
    }

    pub fn set_current_state(&mut self, value: BmcState) -> bool {
        if self.current == value {
            return false;
        }
        self.current = value;
        self.emit(PropertyValue::CurrentBmcState(value));
        true
    }

    pub fn set_requested_transition(&mut self, value: Transition) -> bool {
        if self.requested == value {
            return false;
        }
        self.requested = value;
        self.emit(PropertyValue::RequestedBmcTransition(value));
        true
    }

    pub fn set_last_reboot_cause(&mut self, value: RebootCause) -> bool {
        if self.last_reboot_cause == value {
            return false;
        }
        self.last_reboot_cause = value;
        self.emit(PropertyValue::LastRebootCause(value));
        true
    }

    /// Parse a raw wire value and apply it. Nothing is mutated when the value
    /// does not name a valid enumerator.
    pub fn write_property(
        &mut self,
        property: Property,
        raw: &str,
    ) -> Result<PropertyValue, BmcError> {
        let value = match property {
            Property::CurrentBmcState => {
                let v: BmcState = raw.parse()?;
                self.set_current_state(v);
                PropertyValue::CurrentBmcState(v)
            }
            Property::RequestedBmcTransition => {
                let v: Transition = raw.parse()?;
                self.set_requested_transition(v);
                PropertyValue::RequestedBmcTransition(v)
            }
            Property::LastRebootCause => {
                let v: RebootCause = raw.parse()?;
                self.set_last_reboot_cause(v);
                PropertyValue::LastRebootCause(v)
            }
            Property::LastRebootTime => return Err(BmcError::ReadOnly(property)),
        };
        Ok(value)
    }

    fn emit(&mut self, value: PropertyValue) {
        self.seq += 1;
        debug!("{} -> {}", value.property(), value);
        // No subscribers is fine; the value is still stored
        let _ = self.changes.send(PropertyChange {
            seq: self.seq,
            value,
        });
    }
}
