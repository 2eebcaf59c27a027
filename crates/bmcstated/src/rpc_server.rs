//! RPC Server - Unix socket server publishing the BMC state

use anyhow::{Context, Result};
use bmcstate_common::ipc::{Method, Request, Response, ResponseData};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::manager::ManagerHandle;

/// Bind the daemon socket, replacing a stale one
pub async fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create socket directory {}", dir.display()))?;
    }

    // Remove old socket if it exists
    let _ = tokio::fs::remove_file(path).await;

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))
            .context("Failed to set socket permissions")?;
    }

    info!("RPC server listening on {}", path.display());
    Ok(listener)
}

/// Accept connections forever
pub async fn serve(listener: UnixListener, handle: ManagerHandle) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handle).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(stream: UnixStream, handle: ManagerHandle) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("Failed to read from socket")?;

        if bytes_read == 0 {
            // Connection closed
            break;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                warn!("Invalid request JSON: {}", e);
                continue;
            }
        };

        if request.method == Method::Watch {
            return watch(request.id, &mut reader, &mut writer, &handle).await;
        }

        let response = handle_request(request.id, request.method, &handle).await;
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Handle a single request
async fn handle_request(id: u64, method: Method, handle: &ManagerHandle) -> Response {
    let result = match method {
        Method::Ping => Ok(ResponseData::Pong),
        Method::GetAll => handle.status().await.map(ResponseData::Status),
        Method::Get { property } => handle.get(property).await.map(ResponseData::Value),
        Method::Set { property, value } => {
            handle.set(property, &value).await.map(ResponseData::Accepted)
        }
        Method::Watch => Ok(ResponseData::Watching),
    };

    match result {
        Ok(data) => Response::ok(id, data),
        Err(e) => Response::err(id, &e),
    }
}

/// Stream property changes until the client goes away
async fn watch(
    id: u64,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    handle: &ManagerHandle,
) -> Result<()> {
    let mut changes = handle.subscribe();
    write_response(writer, &Response::ok(id, ResponseData::Watching)).await?;
    debug!("Client watching property changes");

    // Anything the client sends after Watch is ignored; EOF ends the stream
    let mut discard = String::new();
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    let response = Response::ok(id, ResponseData::Changed(change));
                    if write_response(writer, &response).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Watcher fell behind, {} changes skipped", missed);
                }
                Err(RecvError::Closed) => break,
            },
            read = reader.read_line(&mut discard) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => discard.clear(),
            },
        }
    }

    debug!("Watcher disconnected");
    Ok(())
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = serde_json::to_string(response)? + "\n";
    writer
        .write_all(response_json.as_bytes())
        .await
        .context("Failed to write response")
}
