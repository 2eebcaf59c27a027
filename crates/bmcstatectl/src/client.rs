//! Daemon client over the Unix socket

use bmcstate_common::ipc::{Method, Request, Response, ResponseData, DEFAULT_SOCKET_PATH};
use bmcstate_common::BmcError;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// Environment override for the socket path
pub const SOCKET_ENV: &str = "BMCSTATED_SOCKET";

/// Flag > environment > default
pub fn resolve_socket_path(flag: Option<&str>) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| std::env::var_os(SOCKET_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl DaemonClient {
    pub async fn connect(path: &Path) -> Result<Self, BmcError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|_| BmcError::DaemonNotRunning(path.display().to_string()))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            next_id: 1,
        })
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, method: Method) -> Result<ResponseData, BmcError> {
        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::to_string(&Request { id, method })? + "\n";
        self.writer.write_all(line.as_bytes()).await?;

        let response = self.read_response().await?;
        if response.id != id {
            return Err(BmcError::Rpc(format!(
                "response id {} does not match request {}",
                response.id, id
            )));
        }
        response.result.map_err(|e| BmcError::Rpc(e.to_string()))
    }

    /// Next unsolicited response (used after Watch)
    pub async fn read_response(&mut self) -> Result<Response, BmcError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(BmcError::Rpc("daemon closed the connection".to_string()));
        }
        Ok(serde_json::from_str(&line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        assert_eq!(
            resolve_socket_path(Some("/tmp/x.sock")),
            PathBuf::from("/tmp/x.sock")
        );
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket() {
        let err = DaemonClient::connect(Path::new("/nonexistent/bmcstated.sock"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BmcError::DaemonNotRunning(_)));
    }
}
