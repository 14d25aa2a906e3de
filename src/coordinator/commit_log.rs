//! Commit log: propose-then-apply durability for registry decisions
//!
//! Every membership or tablet decision is proposed here first and only
//! applied to memory once the log reports it committed. Replaying the log
//! from the start rebuilds the registry after a restart.
//!
//! On-disk record format for [`WalCommitLog`]:
//! `[MAGIC "ZWL1"][INDEX u64][LEN u32][PAYLOAD][CRC32 u32]`, little endian,
//! checksum over index, length and payload.

use crate::common::{crc32, Error, Result, WalSyncPolicy};
use crate::coordinator::state::Member;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAL_MAGIC: [u8; 4] = *b"ZWL1";
/// Upper bound on a single record payload
const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A state-mutating decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Register or refresh a member; `member.group_id` is the resolved group
    Connect { member: Member, group_created: bool },
    /// First claim of an unowned tablet
    ClaimTablet { predicate: String, group_id: u32 },
}

impl Command {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// A committed command and its position in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub index: u64,
    pub command: Command,
}

/// Durable, ordered log of registry decisions
#[tonic::async_trait]
pub trait CommitLog: Send + Sync {
    /// Returns the committed index once `command` is durable.
    /// An error means the command was not committed.
    async fn propose(&self, command: Command) -> Result<u64>;

    /// Every committed entry, in index order
    async fn entries(&self) -> Result<Vec<LogEntry>>;
}

// === File-backed log ===

/// Longest stretch `WalSyncPolicy::Interval` leaves appended records unsynced
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

struct WalWriter {
    file: File,
    /// Length of the committed prefix; a failed append is cut back to it
    len: u64,
    next_index: u64,
    sync_policy: WalSyncPolicy,
    last_sync: Instant,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Write one record. Either the record is fully in the file and the
    /// index advances, or the file is back to its previous length.
    fn append(&mut self, payload: &[u8]) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Wal(
                "commit log refuses writes after a failed rollback".into(),
            ));
        }
        let index = self.next_index;
        let record = encode_record(index, payload)?;

        if let Err(e) = self.write_record(&record) {
            if let Err(rollback) = self.rollback() {
                self.poisoned = true;
                tracing::error!(
                    len = self.len,
                    "Could not roll back failed commit log append: {}",
                    rollback
                );
            }
            return Err(e);
        }

        self.len += record.len() as u64;
        self.next_index += 1;
        Ok(index)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        // Unbuffered: once this returns the record is in the OS page cache
        self.file.write_all(record)?;

        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::other("injected sync failure").into());
        }

        let sync = match self.sync_policy {
            WalSyncPolicy::Always => true,
            WalSyncPolicy::Interval => self.last_sync.elapsed() >= SYNC_INTERVAL,
            WalSyncPolicy::Never => false,
        };
        if sync {
            self.file.sync_data()?;
            self.last_sync = Instant::now();
        }
        Ok(())
    }

    fn rollback(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.len)?;
        self.file.seek(SeekFrom::Start(self.len))?;
        Ok(())
    }
}

/// Append-only file log
pub struct WalCommitLog {
    path: PathBuf,
    inner: Arc<Mutex<WalWriter>>,
}

impl WalCommitLog {
    /// Open or create the log file, resuming after the last valid record.
    /// A torn tail left by a crash is cut off so new records stay readable.
    pub fn open(path: impl AsRef<Path>, sync_policy: WalSyncPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (last_index, valid_len) = Self::scan(&path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        if file.metadata()?.len() > valid_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "Truncating torn commit log tail"
            );
            file.set_len(valid_len)?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        Ok(Self {
            path,
            inner: Arc::new(Mutex::new(WalWriter {
                file,
                len: valid_len,
                next_index: last_index + 1,
                sync_policy,
                last_sync: Instant::now(),
                poisoned: false,
                #[cfg(test)]
                fail_next_sync: false,
            })),
        })
    }

    /// Make the next append fail after its bytes reach the file
    #[cfg(test)]
    pub(crate) fn fail_next_sync(&self) {
        if let Ok(mut writer) = self.inner.lock() {
            writer.fail_next_sync = true;
        }
    }

    /// Last valid index and the byte length of the valid prefix
    fn scan(path: &Path) -> Result<(u64, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut last = 0;
        let mut valid_len = 0u64;
        loop {
            match read_record(&mut reader) {
                Ok(Some((index, payload))) => {
                    if Command::decode(&payload).is_err() {
                        break;
                    }
                    last = index;
                    valid_len += record_len(payload.len());
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
        Ok((last, valid_len))
    }

    /// Replay committed entries in order
    pub fn replay<F>(path: impl AsRef<Path>, mut callback: F) -> Result<()>
    where
        F: FnMut(LogEntry) -> Result<()>,
    {
        let file = match File::open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        loop {
            match read_record(&mut reader) {
                Ok(Some((index, payload))) => match Command::decode(&payload) {
                    Ok(command) => callback(LogEntry { index, command })?,
                    Err(e) => {
                        tracing::warn!(
                            index,
                            "Commit log replay stopped at undecodable record: {}",
                            e
                        );
                        break;
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Commit log replay stopped at corrupted record: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl CommitLog for WalCommitLog {
    async fn propose(&self, command: Command) -> Result<u64> {
        let payload = command.encode()?;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut writer = inner
                .lock()
                .map_err(|_| Error::CommitLog("writer lock poisoned".into()))?;
            writer
                .append(&payload)
                .map_err(|e| Error::CommitLog(e.to_string()))
        })
        .await
        .map_err(|e| Error::Internal(format!("commit task failed: {}", e)))?
    }

    async fn entries(&self) -> Result<Vec<LogEntry>> {
        let path = self.path.clone();
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            // Hold the writer so no append lands mid-read
            let _writer = inner
                .lock()
                .map_err(|_| Error::CommitLog("writer lock poisoned".into()))?;
            let mut entries = Vec::new();
            WalCommitLog::replay(&path, |entry| {
                entries.push(entry);
                Ok(())
            })?;
            Ok(entries)
        })
        .await
        .map_err(|e| Error::Internal(format!("replay task failed: {}", e)))?
    }
}

fn record_len(payload_len: usize) -> u64 {
    (WAL_MAGIC.len() + 8 + 4 + payload_len + 4) as u64
}

fn checksum(index_bytes: &[u8; 8], len_bytes: &[u8; 4], payload: &[u8]) -> u32 {
    let mut data = Vec::with_capacity(12 + payload.len());
    data.extend_from_slice(index_bytes);
    data.extend_from_slice(len_bytes);
    data.extend_from_slice(payload);
    crc32(&data)
}

fn encode_record(index: u64, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::Wal(format!(
            "record of {} bytes exceeds limit",
            payload.len()
        )));
    }
    let index_bytes = index.to_le_bytes();
    let len_bytes = (payload.len() as u32).to_le_bytes();

    let mut record = Vec::with_capacity(record_len(payload.len()) as usize);
    record.extend_from_slice(&WAL_MAGIC);
    record.extend_from_slice(&index_bytes);
    record.extend_from_slice(&len_bytes);
    record.extend_from_slice(payload);
    record.extend_from_slice(&checksum(&index_bytes, &len_bytes, payload).to_le_bytes());
    Ok(record)
}

/// Read one record; `Ok(None)` on clean end of file
fn read_record<R: Read>(reader: &mut R) -> Result<Option<(u64, Vec<u8>)>> {
    let mut magic = [0u8; 4];
    match reader.read_exact(&mut magic) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    if magic != WAL_MAGIC {
        return Err(Error::Wal("Invalid record magic".into()));
    }

    let mut index_bytes = [0u8; 8];
    reader.read_exact(&mut index_bytes)?;
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_PAYLOAD {
        return Err(Error::Wal(format!("Record length {} out of range", len)));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    if u32::from_le_bytes(crc_bytes) != checksum(&index_bytes, &len_bytes, &payload) {
        return Err(Error::Wal("Checksum mismatch".into()));
    }

    Ok(Some((u64::from_le_bytes(index_bytes), payload)))
}

// === In-memory log ===

/// Volatile log for tests and `--ephemeral` coordinators
#[derive(Default)]
pub struct MemoryCommitLog {
    entries: Mutex<Vec<LogEntry>>,
    fail_next: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryCommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every proposal waits `latency` before committing
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Reject the next proposal
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[tonic::async_trait]
impl CommitLog for MemoryCommitLog {
    async fn propose(&self, command: Command) -> Result<u64> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::CommitLog("injected failure".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::CommitLog("log lock poisoned".into()))?;
        let index = entries.len() as u64 + 1;
        entries.push(LogEntry { index, command });
        Ok(index)
    }

    async fn entries(&self) -> Result<Vec<LogEntry>> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .map_err(|_| Error::CommitLog("log lock poisoned".into()))
    }
}
