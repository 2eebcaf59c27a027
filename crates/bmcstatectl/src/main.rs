//! bmcstatectl - client for the BMC state manager daemon

mod cli;
mod client;

use anyhow::{bail, Context, Result};
use bmcstate_common::ipc::{Method, ResponseData};
use bmcstate_common::{BmcStatus, Property, PropertyValue, Transition};
use chrono::{TimeZone, Utc};
use clap::Parser;
use cli::{Cli, Commands};
use client::{resolve_socket_path, DaemonClient};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = resolve_socket_path(cli.socket.as_deref());
    let mut client = DaemonClient::connect(&socket).await?;

    match cli.command {
        Commands::Status { json } => {
            let status = match client.call(Method::GetAll).await? {
                ResponseData::Status(s) => s,
                other => bail!("Unexpected response: {:?}", other),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Commands::Get { property } => {
            match client.call(Method::Get { property }).await? {
                ResponseData::Value(value) => println!("{}", format_value(&value)),
                other => bail!("Unexpected response: {:?}", other),
            }
        }
        Commands::Set { property, value } => {
            set(&mut client, property, &value).await?;
        }
        Commands::Reboot => {
            set(&mut client, Property::RequestedBmcTransition, Transition::Reboot.as_str()).await?;
        }
        Commands::Poweroff => {
            set(&mut client, Property::RequestedBmcTransition, Transition::Off.as_str()).await?;
        }
        Commands::Watch => {
            client.call(Method::Watch).await?;
            loop {
                let response = client.read_response().await?;
                match response.result {
                    Ok(ResponseData::Changed(change)) => {
                        println!(
                            "#{} {}={}",
                            change.seq,
                            change.value.property(),
                            format_value(&change.value)
                        );
                    }
                    Ok(other) => bail!("Unexpected response: {:?}", other),
                    Err(e) => bail!("{}", e),
                }
            }
        }
        Commands::Ping => {
            client
                .call(Method::Ping)
                .await
                .context("Daemon did not answer ping")?;
            println!("pong");
        }
    }

    Ok(())
}

async fn set(client: &mut DaemonClient, property: Property, value: &str) -> Result<()> {
    let method = Method::Set {
        property,
        value: value.to_string(),
    };
    match client.call(method).await? {
        ResponseData::Accepted(v) => println!("{} = {}", property, format_value(&v)),
        other => bail!("Unexpected response: {:?}", other),
    }
    Ok(())
}

fn print_status(status: &BmcStatus) {
    for property in Property::ALL {
        println!("{:<24}{}", format!("{}:", property), format_value(&status.get(property)));
    }
}

fn format_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::LastRebootTime(0) => "0 (unknown)".to_string(),
        PropertyValue::LastRebootTime(ms) => match i64::try_from(*ms)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        {
            Some(at) => format!("{} ({})", ms, at.to_rfc3339()),
            None => ms.to_string(),
        },
        other => other.to_string(),
    }
}
