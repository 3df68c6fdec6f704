// Copyright 2025 Stoolap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Append-only counter log
//!
//! Every increment is appended as a small CRC-protected record carrying the
//! key and the post-increment value. Values are absolute, so replay keeps the
//! maximum per key and does not care about the order in which concurrent
//! writers landed their records.
//!
//! Record layout (50 bytes):
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Magic        (4 bytes)  0x52544E43 "CNTR"                │
//! │ Version      (1 byte)   Format version (currently 1)     │
//! │ Flags        (1 byte)   Reserved                         │
//! │ Header Size  (2 bytes)  Total header size (24)           │
//! │ LSN          (8 bytes)  Log sequence number              │
//! │ Payload Size (4 bytes)  Size of payload (22)             │
//! │ Reserved     (4 bytes)                                   │
//! ├──────────────────────────────────────────────────────────┤
//! │ RelationId   (4 bytes)                                   │
//! │ AttributeId  (2 bytes)                                   │
//! │ Counter      (8 bytes)                                   │
//! │ Timestamp    (8 bytes)  Nanoseconds since epoch          │
//! ├──────────────────────────────────────────────────────────┤
//! │ CRC32        (4 bytes)  Over header + payload            │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::{Error, FrequencyEntry, Result};
use crate::storage::{PersistenceConfig, SyncMode};

/// Magic bytes for a counter record ("CNTR" in ASCII)
const RECORD_MAGIC: u32 = 0x52544E43;

/// Current record format version
const RECORD_FORMAT_VERSION: u8 = 1;

/// Record header size in bytes
const RECORD_HEADER_SIZE: usize = 24;

/// Payload size: relation(4) + attribute(2) + counter(8) + timestamp(8)
const RECORD_PAYLOAD_SIZE: usize = 22;

/// Full encoded record size including the trailing CRC
pub const RECORD_SIZE: usize = RECORD_HEADER_SIZE + RECORD_PAYLOAD_SIZE + 4;

/// Default counter log file name
pub const COUNTER_LOG_FILE: &str = "counter.log";

/// Suffix of the segment sealed by a compaction in progress
pub const SEALED_SUFFIX: &str = ".sealed";

/// One decoded counter record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    pub lsn: u64,
    pub entry: FrequencyEntry,
    /// Nanoseconds since Unix epoch when the record was written
    pub timestamp: i64,
}

impl CounterRecord {
    pub fn new(lsn: u64, entry: FrequencyEntry) -> Self {
        Self {
            lsn,
            entry,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
        }
    }

    /// Encode to the fixed binary layout
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];

        buf[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
        buf[4] = RECORD_FORMAT_VERSION;
        buf[5] = 0;
        buf[6..8].copy_from_slice(&(RECORD_HEADER_SIZE as u16).to_le_bytes());
        buf[8..16].copy_from_slice(&self.lsn.to_le_bytes());
        buf[16..20].copy_from_slice(&(RECORD_PAYLOAD_SIZE as u32).to_le_bytes());
        // 20..24 reserved

        let p = RECORD_HEADER_SIZE;
        buf[p..p + 4].copy_from_slice(&self.entry.relation_id.to_le_bytes());
        buf[p + 4..p + 6].copy_from_slice(&self.entry.attribute_id.to_le_bytes());
        buf[p + 6..p + 14].copy_from_slice(&self.entry.counter.to_le_bytes());
        buf[p + 14..p + 22].copy_from_slice(&self.timestamp.to_le_bytes());

        let crc_offset = RECORD_SIZE - 4;
        let crc = crc32fast::hash(&buf[..crc_offset]);
        buf[crc_offset..].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decode one record from the start of `data`
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_SIZE {
            return Err(Error::Corrupted(format!(
                "counter record too short: {} bytes",
                data.len()
            )));
        }

        let magic = le_u32(data, 0)?;
        if magic != RECORD_MAGIC {
            return Err(Error::Corrupted(format!(
                "invalid counter record magic: {:#x}",
                magic
            )));
        }
        if data[4] != RECORD_FORMAT_VERSION {
            return Err(Error::Corrupted(format!(
                "unsupported counter record version: {}",
                data[4]
            )));
        }
        let header_size = le_u16(data, 6)? as usize;
        let payload_size = le_u32(data, 16)? as usize;
        if header_size != RECORD_HEADER_SIZE || payload_size != RECORD_PAYLOAD_SIZE {
            return Err(Error::Corrupted(format!(
                "unexpected counter record sizes: header={}, payload={}",
                header_size, payload_size
            )));
        }

        let crc_offset = RECORD_SIZE - 4;
        let stored_crc = le_u32(data, crc_offset)?;
        let computed_crc = crc32fast::hash(&data[..crc_offset]);
        if stored_crc != computed_crc {
            return Err(Error::Corrupted(format!(
                "counter record checksum mismatch: stored={:#x}, computed={:#x}",
                stored_crc, computed_crc
            )));
        }

        let p = RECORD_HEADER_SIZE;
        Ok(Self {
            lsn: le_u64(data, 8)?,
            entry: FrequencyEntry {
                relation_id: le_u32(data, p)?,
                attribute_id: le_u16(data, p + 4)? as i16,
                counter: le_u64(data, p + 6)?,
            },
            timestamp: le_u64(data, p + 14)? as i64,
        })
    }
}

fn le_u16(data: &[u8], pos: usize) -> Result<u16> {
    data.get(pos..pos + 2)
        .and_then(|s| s.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| Error::Corrupted(format!("unexpected end of record at {}", pos)))
}

fn le_u32(data: &[u8], pos: usize) -> Result<u32> {
    data.get(pos..pos + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::Corrupted(format!("unexpected end of record at {}", pos)))
}

fn le_u64(data: &[u8], pos: usize) -> Result<u64> {
    data.get(pos..pos + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::Corrupted(format!("unexpected end of record at {}", pos)))
}

/// Result of scanning a counter log file
#[derive(Debug, Default)]
pub struct ReplayInfo {
    /// Records that passed validation, in file order
    pub records: Vec<CounterRecord>,
    /// Offset just past the last valid record
    pub valid_len: u64,
    /// Bytes skipped while resynchronizing past damaged data
    pub skipped_bytes: u64,
    /// Highest LSN seen
    pub last_lsn: u64,
}

/// Scan raw log bytes, skipping damaged regions by searching for the next magic
pub fn scan_records(data: &[u8]) -> ReplayInfo {
    let mut info = ReplayInfo::default();
    let mut pos = 0usize;

    while pos + RECORD_SIZE <= data.len() {
        match CounterRecord::decode(&data[pos..]) {
            Ok(record) => {
                info.last_lsn = info.last_lsn.max(record.lsn);
                info.records.push(record);
                pos += RECORD_SIZE;
                info.valid_len = pos as u64;
            }
            Err(_) => match find_magic(data, pos + 1) {
                Some(next) => {
                    info.skipped_bytes += (next - pos) as u64;
                    pos = next;
                }
                None => break,
            },
        }
    }

    info
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    let magic = RECORD_MAGIC.to_le_bytes();
    data.get(from..)?
        .windows(4)
        .position(|w| w == magic)
        .map(|offset| from + offset)
}

fn truncate_to_empty(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.sync_all()
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
}

/// Copy the first `len` bytes of `file` onto the end of `target`
fn append_to(target: &Path, file: &mut File, len: u64) -> std::io::Result<()> {
    let mut data = vec![0u8; len as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut data)?;
    let mut out = OpenOptions::new().append(true).open(target)?;
    out.write_all(&data)?;
    out.sync_data()
}

fn sealed_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(SEALED_SUFFIX);
    path.with_file_name(name)
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::store_unavailable(format!(
            "failed to read counter log {:?}: {}",
            path, e
        ))),
    }
}

/// Scan a log file without opening it for writing; a missing file is empty
pub fn read_log_file(path: &Path) -> Result<ReplayInfo> {
    read_bytes(path).map(|data| scan_records(&data))
}

struct LogWriter {
    file: Option<File>,
    /// Encoded records not yet handed to the OS (SyncMode::None)
    buffer: Vec<u8>,
    /// Records in `buffer`
    buffered: u32,
    /// Bytes durably positioned in the file
    position: u64,
    /// Records written since the last fsync
    unsynced: u32,
    /// Set when a failed write could not be rolled back
    broken: bool,
}

/// Append-only log of counter records
pub struct CounterLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    sync_mode: SyncMode,
    flush_trigger: usize,
    sync_batch: u32,
    next_lsn: AtomicU64,
    /// Records appended since the last seal
    records: AtomicU64,
}

impl CounterLog {
    /// Open (or create) the log at `path` and replay its valid records.
    ///
    /// A damaged tail is cut off so new records follow valid data.
    pub fn open(path: impl AsRef<Path>, config: &PersistenceConfig) -> Result<(Self, ReplayInfo)> {
        let path = path.as_ref().to_path_buf();

        let data = read_bytes(&path)?;
        let info = scan_records(&data);

        if info.skipped_bytes > 0 {
            tracing::warn!(
                path = ?path,
                skipped_bytes = info.skipped_bytes,
                "skipped damaged counter log records"
            );
        }

        let mut file = open_log_file(&path)
            .map_err(|e| Error::store_unavailable(format!("failed to open counter log: {}", e)))?;

        if (data.len() as u64) > info.valid_len {
            tracing::warn!(
                path = ?path,
                torn_bytes = data.len() as u64 - info.valid_len,
                "truncating torn counter log tail"
            );
            file.set_len(info.valid_len).map_err(|e| {
                Error::store_unavailable(format!("failed to truncate counter log: {}", e))
            })?;
        }
        file.seek(SeekFrom::Start(info.valid_len))
            .map_err(|e| Error::store_unavailable(format!("failed to seek counter log: {}", e)))?;

        let log = Self {
            path,
            writer: Mutex::new(LogWriter {
                file: Some(file),
                buffer: Vec::new(),
                buffered: 0,
                position: info.valid_len,
                unsynced: 0,
                broken: false,
            }),
            sync_mode: config.sync_mode,
            flush_trigger: config.flush_trigger,
            sync_batch: config.sync_batch.max(1),
            next_lsn: AtomicU64::new(info.last_lsn + 1),
            records: AtomicU64::new(info.records.len() as u64),
        };

        Ok((log, info))
    }

    /// Append one entry and return its LSN
    pub fn append(&self, entry: &FrequencyEntry) -> Result<u64> {
        let mut writer = self.writer.lock();
        if writer.broken {
            return Err(Error::store_unavailable(
                "counter log is in a failed state, reopen the store",
            ));
        }
        if writer.file.is_none() {
            return Err(Error::StoreClosed);
        }

        let lsn = self.next_lsn.load(Ordering::Acquire);
        let encoded = CounterRecord::new(lsn, *entry).encode();

        match self.sync_mode {
            SyncMode::None => {
                writer.buffer.extend_from_slice(&encoded);
                writer.buffered += 1;
                if writer.buffer.len() >= self.flush_trigger || writer.buffered >= self.sync_batch
                {
                    Self::flush_buffer(&mut writer)?;
                }
            }
            SyncMode::Normal => {
                Self::write_through(&mut writer, &encoded)?;
                writer.unsynced += 1;
                if writer.unsynced >= self.sync_batch {
                    Self::sync_or_roll_back(&mut writer, encoded.len())?;
                }
            }
            SyncMode::Full => {
                Self::write_through(&mut writer, &encoded)?;
                writer.unsynced += 1;
                Self::sync_or_roll_back(&mut writer, encoded.len())?;
            }
        }

        self.next_lsn.store(lsn + 1, Ordering::Release);
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(lsn)
    }

    /// Write `data` at the current position, rolling back a partial write
    fn write_through(writer: &mut LogWriter, data: &[u8]) -> Result<()> {
        let position = writer.position;
        let file = writer.file.as_mut().ok_or(Error::StoreClosed)?;

        if let Err(e) = file.write_all(data) {
            // A half-written record would hide everything appended after it
            Self::roll_back(writer, position);
            return Err(Error::store_unavailable(format!(
                "failed to write counter log: {}",
                e
            )));
        }

        writer.position += data.len() as u64;
        Ok(())
    }

    /// Fsync, or drop the record just written so an unacknowledged value
    /// cannot be replayed
    fn sync_or_roll_back(writer: &mut LogWriter, record_len: usize) -> Result<()> {
        let Err(err) = Self::sync_writer(writer) else {
            return Ok(());
        };
        let position = writer.position.saturating_sub(record_len as u64);
        Self::roll_back(writer, position);
        writer.unsynced = writer.unsynced.saturating_sub(1);
        Err(err)
    }

    /// Cut the file back to `position`; a log that cannot be cut is unusable
    fn roll_back(writer: &mut LogWriter, position: u64) {
        let rolled_back = writer.file.as_mut().is_some_and(|file| {
            file.set_len(position).is_ok() && file.seek(SeekFrom::Start(position)).is_ok()
        });
        if rolled_back {
            writer.position = position;
        } else {
            writer.broken = true;
        }
    }

    fn flush_buffer(writer: &mut LogWriter) -> Result<()> {
        if writer.buffer.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut writer.buffer);
        writer.buffered = 0;
        Self::write_through(writer, &data)
    }

    fn sync_writer(writer: &mut LogWriter) -> Result<()> {
        if let Some(file) = writer.file.as_ref() {
            file.sync_data()
                .map_err(|e| Error::store_unavailable(format!("failed to sync counter log: {}", e)))?;
        }
        writer.unsynced = 0;
        Ok(())
    }

    /// Hand buffered records to the OS and fsync
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.file.is_none() {
            return Ok(());
        }
        Self::flush_buffer(&mut writer)?;
        Self::sync_writer(&mut writer)
    }

    /// Move every record written so far into the sealed segment and
    /// continue on an empty log.
    ///
    /// If a sealed segment is still present from a compaction that never
    /// finished, the records are appended to it instead.
    pub fn seal(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = &mut *guard;
        if writer.broken {
            return Err(Error::store_unavailable(
                "counter log is in a failed state, reopen the store",
            ));
        }
        if writer.file.is_none() {
            return Err(Error::StoreClosed);
        }
        Self::flush_buffer(writer)?;

        let sealed = self.sealed_path();
        if sealed.exists() {
            let position = writer.position;
            let file = writer.file.as_mut().ok_or(Error::StoreClosed)?;
            let copied = append_to(&sealed, file, position);
            // Copying moved the cursor
            let restored = match copied {
                Ok(()) => truncate_to_empty(file).is_ok(),
                Err(_) => file.seek(SeekFrom::Start(position)).is_ok(),
            };
            if !restored {
                writer.broken = true;
            }
            if let Err(e) = copied {
                return Err(Error::store_unavailable(format!(
                    "failed to seal counter log: {}",
                    e
                )));
            }
            if !restored {
                return Err(Error::store_unavailable(
                    "failed to empty counter log after sealing",
                ));
            }
        } else {
            // Closed before the rename so it also works where open files
            // cannot be renamed
            writer.file = None;
            let renamed = fs::rename(&self.path, &sealed);
            match open_log_file(&self.path) {
                Ok(mut file) => {
                    let position = if renamed.is_ok() { 0 } else { writer.position };
                    if let Err(e) = file.seek(SeekFrom::Start(position)) {
                        writer.broken = true;
                        return Err(Error::store_unavailable(format!(
                            "failed to seek counter log: {}",
                            e
                        )));
                    }
                    writer.file = Some(file);
                }
                Err(e) => {
                    writer.broken = true;
                    return Err(Error::store_unavailable(format!(
                        "failed to reopen counter log: {}",
                        e
                    )));
                }
            }
            renamed.map_err(|e| {
                Error::store_unavailable(format!("failed to seal counter log: {}", e))
            })?;
        }

        writer.position = 0;
        writer.unsynced = 0;
        self.records.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Remove the sealed segment once a snapshot covers it
    pub fn discard_sealed(&self) -> Result<()> {
        match fs::remove_file(self.sealed_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store_unavailable(format!(
                "failed to remove sealed counter log: {}",
                e
            ))),
        }
    }

    /// Records of the sealed segment, empty when there is none
    pub fn read_sealed(&self) -> Result<ReplayInfo> {
        read_log_file(&self.sealed_path())
    }

    pub fn sealed_path(&self) -> PathBuf {
        sealed_path_for(&self.path)
    }

    /// Flush, sync and close the file; further appends fail with StoreClosed
    pub fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.file.is_none() {
            return Ok(());
        }
        let flushed = Self::flush_buffer(&mut writer).and_then(|_| Self::sync_writer(&mut writer));
        writer.file = None;
        flushed
    }

    /// Records appended since open or the last seal
    pub fn record_count(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// LSN the next record will get
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
