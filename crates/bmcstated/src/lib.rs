//! BMC state daemon library - exposes modules for testing.

pub mod cause_store;
pub mod config;
pub mod discovery;
pub mod events;
pub mod init;
pub mod manager;
pub mod notify;
pub mod rpc_server;
pub mod store;
pub mod transition;
pub mod uptime;
