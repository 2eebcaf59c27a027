//! BMC state model
//!
//! Four published properties describe the controller:
//! - CurrentBMCState: Ready / NotReady
//! - RequestedBMCTransition: None / Off / Reboot
//! - LastRebootTime: epoch milliseconds, 0 when unknown
//! - LastRebootCause: why the controller last restarted
//!
//! Enumerators accept both the short name (`Ready`) and the fully-qualified
//! bus name (`xyz.openbmc_project.State.BMC.BMCState.Ready`) when parsed.

use crate::error::BmcError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BMC_STATE_PREFIX: &str = "xyz.openbmc_project.State.BMC.BMCState.";
const TRANSITION_PREFIX: &str = "xyz.openbmc_project.State.BMC.Transition.";
const REBOOT_CAUSE_PREFIX: &str = "xyz.openbmc_project.State.BMC.RebootCause.";

/// Operational state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BmcState {
    /// Readiness unit reached `active`
    Ready,
    /// Anything else, including unknown
    NotReady,
}

impl BmcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BmcState::Ready => "Ready",
            BmcState::NotReady => "NotReady",
        }
    }
}

impl fmt::Display for BmcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BmcState {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(BMC_STATE_PREFIX).unwrap_or(s) {
            "Ready" => Ok(BmcState::Ready),
            "NotReady" => Ok(BmcState::NotReady),
            _ => Err(BmcError::invalid(Property::CurrentBmcState, s)),
        }
    }
}

/// Transition requested by an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Transition {
    #[default]
    None,
    Off,
    Reboot,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::None => "None",
            Transition::Off => "Off",
            Transition::Reboot => "Reboot",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Transition {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(TRANSITION_PREFIX).unwrap_or(s) {
            "None" => Ok(Transition::None),
            "Off" => Ok(Transition::Off),
            "Reboot" => Ok(Transition::Reboot),
            _ => Err(BmcError::invalid(Property::RequestedBmcTransition, s)),
        }
    }
}

/// Classified reason for the last controller restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RebootCause {
    #[default]
    Unknown,
    /// Power-on reset after input power was lost
    PowerLoss,
    /// Hardware watchdog expired
    WatchdogTimeout,
    /// Physical reset button
    PinholeReset,
    /// This daemon asked the init system to reboot
    SoftwareRequested,
}

impl RebootCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebootCause::Unknown => "Unknown",
            RebootCause::PowerLoss => "PowerLoss",
            RebootCause::WatchdogTimeout => "WatchdogTimeout",
            RebootCause::PinholeReset => "PinholeReset",
            RebootCause::SoftwareRequested => "SoftwareRequested",
        }
    }
}

impl fmt::Display for RebootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RebootCause {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(REBOOT_CAUSE_PREFIX).unwrap_or(s) {
            "Unknown" => Ok(RebootCause::Unknown),
            "PowerLoss" => Ok(RebootCause::PowerLoss),
            "WatchdogTimeout" => Ok(RebootCause::WatchdogTimeout),
            "PinholeReset" => Ok(RebootCause::PinholeReset),
            "SoftwareRequested" => Ok(RebootCause::SoftwareRequested),
            _ => Err(BmcError::invalid(Property::LastRebootCause, s)),
        }
    }
}

/// Published property names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    #[serde(rename = "CurrentBMCState")]
    CurrentBmcState,
    #[serde(rename = "RequestedBMCTransition")]
    RequestedBmcTransition,
    LastRebootTime,
    LastRebootCause,
}

impl Property {
    pub const ALL: [Property; 4] = [
        Property::CurrentBmcState,
        Property::RequestedBmcTransition,
        Property::LastRebootTime,
        Property::LastRebootCause,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Property::CurrentBmcState => "CurrentBMCState",
            Property::RequestedBmcTransition => "RequestedBMCTransition",
            Property::LastRebootTime => "LastRebootTime",
            Property::LastRebootCause => "LastRebootCause",
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Property::LastRebootTime)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Property {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| BmcError::UnknownProperty(s.to_string()))
    }
}

/// A single property value, tagged with its property name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "property", content = "value")]
pub enum PropertyValue {
    #[serde(rename = "CurrentBMCState")]
    CurrentBmcState(BmcState),
    #[serde(rename = "RequestedBMCTransition")]
    RequestedBmcTransition(Transition),
    LastRebootTime(u64),
    LastRebootCause(RebootCause),
}

impl PropertyValue {
    pub fn property(&self) -> Property {
        match self {
            PropertyValue::CurrentBmcState(_) => Property::CurrentBmcState,
            PropertyValue::RequestedBmcTransition(_) => Property::RequestedBmcTransition,
            PropertyValue::LastRebootTime(_) => Property::LastRebootTime,
            PropertyValue::LastRebootCause(_) => Property::LastRebootCause,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::CurrentBmcState(v) => write!(f, "{}", v),
            PropertyValue::RequestedBmcTransition(v) => write!(f, "{}", v),
            PropertyValue::LastRebootTime(v) => write!(f, "{}", v),
            PropertyValue::LastRebootCause(v) => write!(f, "{}", v),
        }
    }
}

/// All four properties at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmcStatus {
    #[serde(rename = "CurrentBMCState")]
    pub current_bmc_state: BmcState,
    #[serde(rename = "RequestedBMCTransition")]
    pub requested_bmc_transition: Transition,
    #[serde(rename = "LastRebootTime")]
    pub last_reboot_time: u64,
    #[serde(rename = "LastRebootCause")]
    pub last_reboot_cause: RebootCause,
}

impl BmcStatus {
    pub fn get(&self, property: Property) -> PropertyValue {
        match property {
            Property::CurrentBmcState => PropertyValue::CurrentBmcState(self.current_bmc_state),
            Property::RequestedBmcTransition => {
                PropertyValue::RequestedBmcTransition(self.requested_bmc_transition)
            }
            Property::LastRebootTime => PropertyValue::LastRebootTime(self.last_reboot_time),
            Property::LastRebootCause => PropertyValue::LastRebootCause(self.last_reboot_cause),
        }
    }
}

/// Outward notification emitted when a property actually changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Monotonic per-process sequence number
    pub seq: u64,
    pub value: PropertyValue,
}
