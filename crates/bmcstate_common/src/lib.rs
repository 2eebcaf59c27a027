//! Shared types for bmcstated and bmcstatectl.

pub mod error;
pub mod ipc;
pub mod types;

pub use error::BmcError;
pub use types::{
    BmcState, BmcStatus, Property, PropertyChange, PropertyValue, RebootCause, Transition,
};

/// Single source of truth for the workspace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
