//! Error types for the BMC state manager.

use crate::types::Property;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BmcError {
    #[error("Daemon not running (socket {0} unreachable)")]
    DaemonNotRunning(String),

    #[error("Invalid value '{value}' for {property}")]
    InvalidValue { property: Property, value: String },

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("{0} is read-only")]
    ReadOnly(Property),

    #[error("Transition rejected: {0}")]
    TransitionRejected(String),

    #[error("State manager unavailable")]
    ManagerUnavailable,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BmcError {
    pub fn invalid(property: Property, value: &str) -> Self {
        BmcError::InvalidValue {
            property,
            value: value.to_string(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            BmcError::DaemonNotRunning(_) => -32000,
            BmcError::InvalidValue { .. } => -32602,
            BmcError::UnknownProperty(_) => -32601,
            BmcError::ReadOnly(_) => -32010,
            BmcError::TransitionRejected(_) => -32011,
            BmcError::ManagerUnavailable => -32012,
            BmcError::Rpc(_) => -32600,
            BmcError::Io(_) => -32006,
            BmcError::Json(_) => -32700,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = BmcError::invalid(Property::RequestedBmcTransition, "Halt");
        assert_eq!(
            err.to_string(),
            "Invalid value 'Halt' for RequestedBMCTransition"
        );
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            BmcError::DaemonNotRunning("/tmp/x".into()),
            BmcError::invalid(Property::CurrentBmcState, "x"),
            BmcError::UnknownProperty("x".into()),
            BmcError::ReadOnly(Property::LastRebootTime),
            BmcError::TransitionRejected("x".into()),
            BmcError::ManagerUnavailable,
            BmcError::Rpc("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
