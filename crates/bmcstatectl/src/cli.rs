//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap.
//! Keeps argument parsing separate from execution logic.

use bmcstate_common::Property;
use clap::{Parser, Subcommand};

/// BMC state manager CLI
#[derive(Parser)]
#[command(name = "bmcstatectl")]
#[command(about = "Query and control the BMC state manager", long_about = None)]
#[command(version = bmcstate_common::VERSION)]
pub struct Cli {
    /// Path to daemon socket (overrides $BMCSTATED_SOCKET and the default)
    #[arg(long, global = true)]
    pub socket: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show all state properties
    Status {
        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Read one property (CurrentBMCState, RequestedBMCTransition, LastRebootTime, LastRebootCause)
    Get {
        #[arg(value_parser = parse_property)]
        property: Property,
    },

    /// Write one property (LastRebootTime is read-only)
    Set {
        #[arg(value_parser = parse_writable_property)]
        property: Property,
        value: String,
    },

    /// Request a BMC reboot
    Reboot,

    /// Request the BMC to power off
    Poweroff,

    /// Print property changes as they happen
    Watch,

    /// Ping daemon (for health checks)
    Ping,
}

fn parse_property(s: &str) -> Result<Property, String> {
    s.parse().map_err(|e: bmcstate_common::BmcError| e.to_string())
}

fn parse_writable_property(s: &str) -> Result<Property, String> {
    let property = parse_property(s)?;
    if !property.is_writable() {
        return Err(format!("{} is read-only", property));
    }
    Ok(property)
}
