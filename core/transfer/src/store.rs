// sentinel/core/transfer/src/store.rs

use crate::error::TransferError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Index entry for one stored log. Immutable once created; removed only by
/// quota-driven eviction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredLog {
    pub log_id: String,
    pub filename: String,
    pub uploader_pubkey: String,
    pub upload_ts: i64,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding `<log_id>.log` payloads and `<log_id>.meta`
    /// sidecars
    pub dir: PathBuf,

    /// Largest accepted upload
    pub max_log_size: u64,

    /// Cap on total stored payload bytes
    pub max_storage: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/logs"),
            max_log_size: 10 * 1024 * 1024,
            max_storage: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StoreStats {
    pub total_logs: usize,
    pub used_bytes: u64,
}

struct StoreInner {
    index: HashMap<String, StoredLog>,
    used_bytes: u64,
}

/// Disk-backed log store with a rebuildable in-memory index.
///
/// Admission, eviction and the usage counter share one lock, so the
/// decision to evict and the bytes it accounts for can never tear. A log
/// becomes visible in the index only after its payload and sidecar are
/// fully on disk; an interrupted upload leaves no index entry behind.
pub struct LogStore {
    config: StoreConfig,
    inner: Mutex<StoreInner>,
}

impl LogStore {
    /// Open the store, rebuilding the index from sidecar files.
    pub fn open(config: StoreConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;

        let mut index = HashMap::new();
        let mut used_bytes = 0u64;
        for entry in std::fs::read_dir(&config.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            match read_sidecar(&path) {
                Ok(stored) => {
                    used_bytes += stored.size_bytes;
                    index.insert(stored.log_id.clone(), stored);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable sidecar");
                }
            }
        }

        info!(
            logs = index.len(),
            used_bytes, "log store opened"
        );
        Ok(Self {
            config,
            inner: Mutex::new(StoreInner { index, used_bytes }),
        })
    }

    pub fn max_log_size(&self) -> u64 {
        self.config.max_log_size
    }

    /// Store one upload. Evicts strictly older logs, oldest first, when
    /// the payload would push usage past the cap; fails with `StorageFull`
    /// when eviction cannot free enough without touching entries at least
    /// as new as the incoming one.
    pub fn put(
        &self,
        bytes: &[u8],
        filename: &str,
        uploader_pubkey: &str,
        upload_ts: i64,
    ) -> Result<StoredLog, TransferError> {
        let size = bytes.len() as u64;
        if size > self.config.max_log_size {
            return Err(TransferError::SizeExceeded {
                limit: self.config.max_log_size,
            });
        }

        let sha256 = hex::encode(Sha256::digest(bytes));
        let log_id = sha256[..16].to_string();

        let mut inner = self.inner.lock();

        // Identical content re-uploaded is served from the existing entry.
        if let Some(existing) = inner.index.get(&log_id) {
            return Ok(existing.clone());
        }

        while inner.used_bytes + size > self.config.max_storage {
            let oldest = inner
                .index
                .values()
                .min_by_key(|stored| (stored.upload_ts, stored.log_id.clone()))
                .cloned();
            match oldest {
                Some(victim) if victim.upload_ts < upload_ts => {
                    self.remove_files(&victim.log_id);
                    inner.used_bytes -= victim.size_bytes;
                    inner.index.remove(&victim.log_id);
                    info!(log_id = %victim.log_id, freed = victim.size_bytes, "evicted stored log");
                }
                _ => return Err(TransferError::StorageFull),
            }
        }

        let stored = StoredLog {
            log_id: log_id.clone(),
            filename: filename.to_string(),
            uploader_pubkey: uploader_pubkey.to_string(),
            upload_ts,
            sha256,
            size_bytes: size,
        };

        // Payload first, sidecar second, index last. Failures before the
        // index insert leave at most unreferenced files to clean up.
        if let Err(e) = self.write_files(&stored, bytes) {
            self.remove_files(&log_id);
            return Err(e.into());
        }

        inner.used_bytes += size;
        inner.index.insert(log_id, stored.clone());
        debug!(log_id = %stored.log_id, size, "stored uploaded log");
        Ok(stored)
    }

    /// Fetch a log's metadata and payload.
    pub fn get(&self, log_id: &str) -> Result<(StoredLog, Vec<u8>), TransferError> {
        let stored = self.metadata(log_id).ok_or(TransferError::NotFound)?;
        let bytes = std::fs::read(self.log_path(log_id))?;
        Ok((stored, bytes))
    }

    pub fn metadata(&self, log_id: &str) -> Option<StoredLog> {
        if !valid_log_id(log_id) {
            return None;
        }
        self.inner.lock().index.get(log_id).cloned()
    }

    /// Logs uploaded at or after `since_ts`, newest first.
    pub fn recent(&self, since_ts: i64) -> Vec<StoredLog> {
        let mut logs: Vec<StoredLog> = self
            .inner
            .lock()
            .index
            .values()
            .filter(|stored| stored.upload_ts >= since_ts)
            .cloned()
            .collect();
        logs.sort_by_key(|stored| std::cmp::Reverse(stored.upload_ts));
        logs
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            total_logs: inner.index.len(),
            used_bytes: inner.used_bytes,
        }
    }

    fn log_path(&self, log_id: &str) -> PathBuf {
        self.config.dir.join(format!("{log_id}.log"))
    }

    fn meta_path(&self, log_id: &str) -> PathBuf {
        self.config.dir.join(format!("{log_id}.meta"))
    }

    fn write_files(&self, stored: &StoredLog, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::write(self.log_path(&stored.log_id), bytes)?;
        let sidecar = serde_json::to_vec(stored)?;
        std::fs::write(self.meta_path(&stored.log_id), sidecar)?;
        Ok(())
    }

    fn remove_files(&self, log_id: &str) {
        for path in [self.log_path(log_id), self.meta_path(log_id)] {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove stored file");
                }
            }
        }
    }
}

/// Log ids are the first 16 hex chars of the payload hash; anything else
/// never names a stored file.
fn valid_log_id(log_id: &str) -> bool {
    log_id.len() == 16 && log_id.bytes().all(|b| b.is_ascii_hexdigit())
}

fn read_sidecar(path: &Path) -> std::io::Result<StoredLog> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}
