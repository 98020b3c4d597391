//! Write-Ahead Logging (WAL) and snapshot persistence for the key-value store

use super::KvStore;
use super::memory::scan_ordered;
use crate::core::{LedgerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

fn storage_err(context: &str, err: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("{}: {}", context, err))
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// WAL Entry Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WalEntry {
    Set { key: String, value: Vec<u8> },
    Delete { key: String },
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub entries: BTreeMap<String, Vec<u8>>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: u64,
    pub entry_count: usize,
}

impl StoreSnapshot {
    pub fn new(entries: BTreeMap<String, Vec<u8>>) -> Self {
        let entry_count = entries.len();
        Self {
            version: 1,
            entries,
            metadata: SnapshotMetadata {
                created_at: unix_millis(),
                entry_count,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every WAL append
    Sync,
    /// flush to the OS, let it decide when to hit disk
    #[default]
    Async,
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: BufWriter<File>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_err("Failed to create WAL directory", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .map_err(|e| storage_err("Failed to open WAL file", e))?;

        Ok(Self {
            wal_path,
            wal_file: BufWriter::new(file),
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let serialized = rmp_serde::to_vec(entry).map_err(|e| storage_err("Failed to serialize WAL entry", e))?;
        let len = serialized.len() as u32;
        self.wal_file.write_all(&len.to_le_bytes()).map_err(|e| storage_err("Failed to write WAL", e))?;
        self.wal_file.write_all(&serialized).map_err(|e| storage_err("Failed to write WAL", e))?;
        self.wal_file.flush().map_err(|e| storage_err("Failed to flush WAL", e))?;
        if self.durability_mode == DurabilityMode::Sync {
            self.wal_file.get_mut().sync_all().map_err(|e| storage_err("Failed to sync WAL", e))?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    /// Reads every complete frame; a torn trailing frame (crash mid-append) is dropped.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        Ok(self.read_frames()?.0)
    }

    /// Replays the log and cuts off a torn tail, so later appends start on a
    /// frame boundary.
    pub fn recover(&mut self) -> Result<Vec<WalEntry>> {
        let (entries, valid_len) = self.read_frames()?;
        let file = self.wal_file.get_ref();
        let file_len = file.metadata().map_err(|e| storage_err("Failed to stat WAL", e))?.len();
        if file_len > valid_len {
            tracing::warn!(
                path = %self.wal_path.display(),
                dropped_bytes = file_len - valid_len,
                "truncating torn WAL tail"
            );
            file.set_len(valid_len).map_err(|e| storage_err("Failed to truncate WAL", e))?;
            file.sync_all().map_err(|e| storage_err("Failed to sync WAL", e))?;
        }
        Ok(entries)
    }

    /// Complete entries plus the byte length they occupy.
    fn read_frames(&self) -> Result<(Vec<WalEntry>, u64)> {
        if !self.wal_path.exists() {
            return Ok((Vec::new(), 0));
        }
        let file = File::open(&self.wal_path).map_err(|e| storage_err("Failed to open WAL for reading", e))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(storage_err("Failed to read WAL entry length", e)),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(path = %self.wal_path.display(), "dropping torn WAL frame");
                    break;
                }
                Err(e) => return Err(storage_err("Failed to read WAL entry data", e)),
            }
            let entry: WalEntry = rmp_serde::from_slice(&data).map_err(|e| storage_err("Failed to deserialize WAL entry", e))?;
            entries.push(entry);
            valid_len += 4 + len as u64;
        }
        Ok((entries, valid_len))
    }

    pub fn clear(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| storage_err("Failed to truncate WAL", e))?;
        self.wal_file = BufWriter::new(file);
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold.max(1);
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Atomically replaces the snapshot file (write temp, fsync, rename).
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = self
            .snapshot_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(|e| storage_err("Failed to create snapshot directory", e))?;

        let serialized = rmp_serde::to_vec(snapshot).map_err(|e| storage_err("Failed to serialize snapshot", e))?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| storage_err("Failed to create temp file", e))?;
        temp.write_all(&serialized).map_err(|e| storage_err("Failed to write snapshot", e))?;
        temp.as_file().sync_all().map_err(|e| storage_err("Failed to sync snapshot", e))?;
        temp.persist(&self.snapshot_path).map_err(|e| storage_err("Failed to rename snapshot", e))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path).map_err(|e| storage_err("Failed to open snapshot", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| storage_err("Failed to read snapshot", e))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| storage_err("Failed to deserialize snapshot", e))?;
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// File-backed store
// ============================================================================

struct FileState {
    entries: BTreeMap<String, Vec<u8>>,
    wal: WalManager,
    snapshot: SnapshotManager,
}

impl FileState {
    fn log(&mut self, entry: WalEntry) -> Result<()> {
        self.wal.append(&entry)?;
        match entry {
            WalEntry::Set { key, value } => {
                self.entries.insert(key, value);
            }
            WalEntry::Delete { key } => {
                self.entries.remove(&key);
            }
        }
        if self.wal.needs_checkpoint() {
            self.checkpoint()?;
        }
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        let snapshot = StoreSnapshot::new(self.entries.clone());
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        tracing::debug!(entries = snapshot.metadata.entry_count, "kv snapshot written");
        Ok(())
    }
}

/// Durable key-value engine: every mutation is appended to a WAL before it
/// becomes visible, and the WAL is folded into a snapshot every
/// `snapshot_every` mutations.
pub struct FileKvStore {
    state: RwLock<FileState>,
}

impl FileKvStore {
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        durability_mode: DurabilityMode,
        snapshot_every: usize,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let mut wal = WalManager::new(data_dir.join("pointgate.wal"), durability_mode)?;
        wal.set_checkpoint_threshold(snapshot_every);
        let snapshot = SnapshotManager::new(data_dir.join("pointgate.snapshot"));

        let mut entries = match snapshot.load()? {
            Some(snapshot) => snapshot.entries,
            None => BTreeMap::new(),
        };
        let replayed = wal.recover()?;
        let replayed_count = replayed.len();
        for entry in replayed {
            match entry {
                WalEntry::Set { key, value } => {
                    entries.insert(key, value);
                }
                WalEntry::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        tracing::info!(
            dir = %data_dir.display(),
            keys = entries.len(),
            wal_entries = replayed_count,
            "kv store recovered"
        );

        Ok(Self {
            state: RwLock::new(FileState { entries, wal, snapshot }),
        })
    }

    /// Force the WAL into a snapshot now.
    pub async fn checkpoint(&self) -> Result<()> {
        self.state.write().await.checkpoint()
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.read().await.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.state.write().await.log(WalEntry::Set {
            key: key.to_string(),
            value,
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.entries.contains_key(key) {
            return Ok(false);
        }
        state.log(WalEntry::Delete { key: key.to_string() })?;
        Ok(true)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(scan_ordered(&state.entries, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wal_append_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalManager::new(temp_dir.path().join("test.wal"), DurabilityMode::Sync).unwrap();
        wal.append(&WalEntry::Set { key: "a".into(), value: b"1".to_vec() }).unwrap();
        wal.append(&WalEntry::Delete { key: "a".into() }).unwrap();
        let entries = wal.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], WalEntry::Delete { key: "a".into() });
    }

    #[test]
    fn test_torn_frame_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("torn.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        wal.append(&WalEntry::Set { key: "a".into(), value: b"1".to_vec() }).unwrap();
        drop(wal);

        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&64u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        let wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        assert_eq!(wal.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_after_torn_tail_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("pointgate.wal");
        {
            let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Sync, 1000).unwrap();
            store.set("account:alice", b"{}".to_vec()).await.unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&64u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
        drop(file);

        {
            let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Sync, 1000).unwrap();
            store.set("account:bob", b"{}".to_vec()).await.unwrap();
        }

        let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Sync, 1000).unwrap();
        assert_eq!(
            store.scan_prefix("account:").await.unwrap(),
            vec!["account:alice".to_string(), "account:bob".to_string()]
        );
    }

    #[test]
    fn test_recover_truncates_partial_length_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("short.wal");
        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        wal.append(&WalEntry::Set { key: "a".into(), value: b"1".to_vec() }).unwrap();
        let clean_len = fs::metadata(&wal_path).unwrap().len();
        drop(wal);

        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[9, 9]).unwrap();
        drop(file);

        let mut wal = WalManager::new(&wal_path, DurabilityMode::Sync).unwrap();
        assert_eq!(wal.recover().unwrap().len(), 1);
        assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
    }

    #[tokio::test]
    async fn test_recovery_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Sync, 1000).unwrap();
            store.set("account:alice", b"{}".to_vec()).await.unwrap();
            store.set("account:bob", b"{}".to_vec()).await.unwrap();
            assert!(store.delete("account:bob").await.unwrap());
        }
        let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Sync, 1000).unwrap();
        assert_eq!(store.scan_prefix("account:").await.unwrap(), vec!["account:alice".to_string()]);
    }

    #[tokio::test]
    async fn test_checkpoint_folds_wal_into_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Async, 2).unwrap();
            store.set("k1", b"1".to_vec()).await.unwrap();
            store.set("k2", b"2".to_vec()).await.unwrap();
            store.set("k3", b"3".to_vec()).await.unwrap();
            assert_eq!(store.state.read().await.wal.entries_since_checkpoint(), 1);
        }
        let snapshot = SnapshotManager::new(temp_dir.path().join("pointgate.snapshot"));
        assert!(snapshot.exists());
        assert_eq!(snapshot.load().unwrap().unwrap().metadata.entry_count, 2);

        let store = FileKvStore::open(temp_dir.path(), DurabilityMode::Async, 2).unwrap();
        assert_eq!(store.get("k3").await.unwrap(), Some(b"3".to_vec()));
    }
}
