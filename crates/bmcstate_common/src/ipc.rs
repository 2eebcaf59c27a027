//! IPC protocol between bmcstated and its clients
//!
//! Newline-delimited JSON over a Unix socket. Every request line gets exactly
//! one response line, except `Watch`, after which the server keeps writing
//! `Changed` responses until the client hangs up.

use crate::error::BmcError;
use crate::types::{BmcStatus, Property, PropertyChange, PropertyValue};
use serde::{Deserialize, Serialize};

/// Default daemon socket
pub const DEFAULT_SOCKET_PATH: &str = "/run/bmcstate/bmcstated.sock";

/// IPC request from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
}

/// IPC response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, ErrorData>,
}

impl Response {
    pub fn ok(id: u64, data: ResponseData) -> Self {
        Self { id, result: Ok(data) }
    }

    pub fn err(id: u64, err: &BmcError) -> Self {
        Self {
            id,
            result: Err(ErrorData::from(err)),
        }
    }
}

/// Request methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    /// Health check
    Ping,

    /// Read all four properties
    GetAll,

    /// Read one property
    Get { property: Property },

    /// Write one property; `value` is the short or bus enumerator name
    Set { property: Property, value: String },

    /// Stream property changes until disconnect
    Watch,
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseData {
    Pong,
    Status(BmcStatus),
    Value(PropertyValue),
    /// Value accepted by a write
    Accepted(PropertyValue),
    /// Watch stream established
    Watching,
    Changed(PropertyChange),
}

/// Error carried over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
}

impl From<&BmcError> for ErrorData {
    fn from(err: &BmcError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}
