//! Reboot-cause persistence
//!
//! A single JSON record survives the reboot it describes. It is written when
//! this daemon requests a reboot and consumed by the next start, so a stale
//! record never explains a later, unrelated reboot.
//!
//! When no record exists the kernel watchdog's boot status flags are the
//! fallback source (see `cause_from_bootstatus`).

use async_trait::async_trait;
use bmcstate_common::RebootCause;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Watchdog bootstatus: external reset line 1 (watchdog expiry)
pub const WDIOF_EXTERN1: u32 = 0x0004;
/// Watchdog bootstatus: card was reset by power-on
pub const WDIOF_CARDRESET: u32 = 0x0020;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseRecord {
    pub cause: RebootCause,
    pub recorded_at: DateTime<Utc>,
}

impl CauseRecord {
    pub fn now(cause: RebootCause) -> Self {
        Self {
            cause,
            recorded_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait CauseStore: Send + Sync {
    /// Read and remove the persisted record. `Ok(None)` when there is none;
    /// an unparseable record is removed and reported as `InvalidData`.
    async fn take(&self) -> io::Result<Option<CauseRecord>>;

    /// Read the persisted record without consuming it
    async fn load(&self) -> io::Result<Option<CauseRecord>>;

    async fn store(&self, record: &CauseRecord) -> io::Result<()>;

    async fn clear(&self) -> io::Result<()>;
}

/// Record kept as a JSON file, replaced atomically
#[derive(Debug, Clone)]
pub struct FileCauseStore {
    path: PathBuf,
}

impl FileCauseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CauseStore for FileCauseStore {
    async fn take(&self) -> io::Result<Option<CauseRecord>> {
        let content = match self.read().await? {
            Some(c) => c,
            None => return Ok(None),
        };
        self.clear().await?;
        parse_record(&content).map(Some)
    }

    async fn load(&self) -> io::Result<Option<CauseRecord>> {
        match self.read().await? {
            Some(content) => parse_record(&content).map(Some),
            None => Ok(None),
        }
    }

    async fn store(&self, record: &CauseRecord) -> io::Result<()> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        atomic_write(&self.path, content.as_bytes()).await
    }

    async fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn parse_record(content: &str) -> io::Result<CauseRecord> {
    serde_json::from_str(content).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

/// Write to a sibling temp file, then rename over the target
async fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data).await?;
    fs::rename(&temp_path, path).await
}

/// Decode watchdog boot status flags
pub fn cause_from_bootstatus(flags: u32) -> Option<RebootCause> {
    if flags & WDIOF_EXTERN1 != 0 {
        Some(RebootCause::WatchdogTimeout)
    } else if flags & WDIOF_CARDRESET != 0 {
        Some(RebootCause::PowerLoss)
    } else {
        None
    }
}

/// Read the sysfs bootstatus attribute (decimal, or hex with 0x)
pub async fn read_bootstatus(path: &Path) -> io::Result<u32> {
    let content = fs::read_to_string(path).await?;
    let text = content.trim();
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bootstatus_flags() {
        assert_eq!(cause_from_bootstatus(0), None);
        assert_eq!(cause_from_bootstatus(WDIOF_EXTERN1), Some(RebootCause::WatchdogTimeout));
        assert_eq!(cause_from_bootstatus(WDIOF_CARDRESET), Some(RebootCause::PowerLoss));
        // Watchdog wins when both are latched
        assert_eq!(
            cause_from_bootstatus(WDIOF_EXTERN1 | WDIOF_CARDRESET),
            Some(RebootCause::WatchdogTimeout)
        );
    }

    #[tokio::test]
    async fn test_read_bootstatus_formats() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bootstatus");

        std::fs::write(&path, "32\n").unwrap();
        assert_eq!(read_bootstatus(&path).await.unwrap(), WDIOF_CARDRESET);

        std::fs::write(&path, "0x4\n").unwrap();
        assert_eq!(read_bootstatus(&path).await.unwrap(), WDIOF_EXTERN1);

        std::fs::write(&path, "garbage").unwrap();
        assert!(read_bootstatus(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_store_then_take_consumes_record() {
        let temp = TempDir::new().unwrap();
        let store = FileCauseStore::new(temp.path().join("state/cause.json"));

        let record = CauseRecord::now(RebootCause::SoftwareRequested);
        store.store(&record).await.unwrap();
        assert!(store.path().exists());

        assert_eq!(store.take().await.unwrap(), Some(record));
        assert!(!store.path().exists());
        assert_eq!(store.take().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_leaves_record_in_place() {
        let temp = TempDir::new().unwrap();
        let store = FileCauseStore::new(temp.path().join("cause.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let record = CauseRecord::now(RebootCause::SoftwareRequested);
        store.store(&record).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(record.clone()));
        assert_eq!(store.take().await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_take_missing_record() {
        let temp = TempDir::new().unwrap();
        let store = FileCauseStore::new(temp.path().join("cause.json"));
        assert_eq!(store.take().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_record_is_invalid_data_and_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cause.json");
        std::fs::write(&path, r#"{"cause":"Meteor"}"#).unwrap();

        let store = FileCauseStore::new(&path);
        let err = store.take().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FileCauseStore::new(temp.path().join("cause.json"));
        store.clear().await.unwrap();
        store.clear().await.unwrap();
    }
}
