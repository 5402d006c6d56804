//! File-backed ledger store.
//!
//! Layout inside the data directory:
//! - `blacklist.json`: dynamic blacklist, rewritten on every change
//! - `incidents.jsonl`: one abuse incident per line, append-only
//! - `audit.jsonl`: one audit entry per line, append-only

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::abuse::ledger::{AbuseIncident, AuditEntry};
use crate::error::StoreResult;
use crate::traits::store::{AuditStore, BlacklistStore, IncidentStore};

const BLACKLIST_FILE: &str = "blacklist.json";
const INCIDENTS_FILE: &str = "incidents.jsonl";
const AUDIT_FILE: &str = "audit.jsonl";

/// JSON / JSON Lines store rooted at a directory.
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes writers so appended lines never interleave
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append_line<T: Serialize>(&self, file: &str, value: &T) -> StoreResult<()> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        handle.write_all(line.as_bytes()).await?;
        handle.flush().await?;
        Ok(())
    }

    /// Last `limit` parseable lines of a JSONL file, oldest first.
    async fn tail_lines<T: DeserializeOwned>(&self, file: &str, limit: usize) -> StoreResult<Vec<T>> {
        let path = self.dir.join(file);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tail = VecDeque::with_capacity(limit.min(1024));
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(value) => {
                    if tail.len() == limit {
                        tail.pop_front();
                    }
                    if limit > 0 {
                        tail.push_back(value);
                    }
                }
                Err(e) => {
                    warn!(file, line = number + 1, error = %e, "Skipping unreadable line");
                }
            }
        }

        Ok(tail.into())
    }
}

#[async_trait]
impl BlacklistStore for JsonFileStore {
    async fn load_blacklist(&self) -> StoreResult<Vec<String>> {
        match fs::read(self.dir.join(BLACKLIST_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_blacklist(&self, domains: &[String]) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(domains)?;
        let path = self.dir.join(BLACKLIST_FILE);
        let tmp = self.dir.join(format!("{BLACKLIST_FILE}.tmp"));

        let _guard = self.write_lock.lock().await;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for JsonFileStore {
    async fn append_incident(&self, incident: &AbuseIncident) -> StoreResult<()> {
        self.append_line(INCIDENTS_FILE, incident).await
    }

    async fn load_incidents(&self, limit: usize) -> StoreResult<Vec<AbuseIncident>> {
        self.tail_lines(INCIDENTS_FILE, limit).await
    }
}

#[async_trait]
impl AuditStore for JsonFileStore {
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.append_line(AUDIT_FILE, entry).await
    }
}
