//! Append-only snapshot log.
//!
//! One framed row per snapshot: fixed header (magic, version, flags,
//! sequence id, observation time in epoch microseconds, payload length),
//! MessagePack payload, CRC32 of the payload. Rows are written in full and
//! fsynced before they are considered committed; the open-time scan stops
//! at the first torn or corrupt row and truncates it away so the log always
//! ends on a complete row.

use crate::error::{MonitorError, Result};
use crate::types::SequenceId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for snapshot rows.
const ROW_MAGIC: &[u8; 4] = b"DWS\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Fixed header size: magic + version + flags + sequence + timestamp + payload length.
const ROW_HEADER_SIZE: u64 = 4 + 1 + 1 + 8 + 8 + 4;

/// Header of one committed row, as recovered by the open-time scan.
#[derive(Clone, Copy, Debug)]
pub struct RowInfo {
    pub sequence: SequenceId,
    pub observed_at: DateTime<Utc>,
    pub offset: u64,
}

/// A fully decoded row.
#[derive(Clone, Debug)]
pub struct Row {
    pub sequence: SequenceId,
    pub observed_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

/// Append-only log of snapshot rows.
pub struct SnapshotLog {
    path: PathBuf,

    /// Log file handle.
    file: RwLock<File>,

    /// Current committed size (append position).
    file_size: RwLock<u64>,
}

impl SnapshotLog {
    /// Open or create the log, scanning existing rows.
    ///
    /// Returns the log together with the headers of every committed row in
    /// offset order. A torn tail (crash mid-append) is truncated.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<RowInfo>)> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let disk_size = file.metadata()?.len();
        let (rows, committed_size) = Self::scan(&file, disk_size)?;

        if committed_size < disk_size {
            warn!(
                path = %path.display(),
                committed = committed_size,
                on_disk = disk_size,
                "truncating torn tail of snapshot log"
            );
            file.set_len(committed_size)?;
            file.sync_all()?;
        }

        Ok((
            Self {
                path,
                file: RwLock::new(file),
                file_size: RwLock::new(committed_size),
            },
            rows,
        ))
    }

    /// Append one row and fsync it.
    ///
    /// Returns the offset the row was written at. The row is durable when
    /// this returns; a failure anywhere leaves the previously committed
    /// rows untouched.
    pub fn append(
        &self,
        sequence: SequenceId,
        observed_at: DateTime<Utc>,
        payload: &[u8],
    ) -> Result<u64> {
        let mut file = self.file.write();

        let offset = *self.file_size.read();
        file.seek(SeekFrom::Start(offset))?;

        file.write_all(ROW_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        file.write_all(&[0u8])?; // flags, reserved
        file.write_all(&sequence.0.to_le_bytes())?;
        file.write_all(&observed_at.timestamp_micros().to_le_bytes())?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(payload)?;

        let checksum = crc32fast::hash(payload);
        file.write_all(&checksum.to_le_bytes())?;

        // Audit rows are written once every check interval at most; sync
        // every append rather than batching.
        file.sync_all()?;

        *self.file_size.write() = file.stream_position()?;

        Ok(offset)
    }

    /// Read and verify the row at a given offset.
    pub fn read_at(&self, offset: u64) -> Result<Row> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ROW_MAGIC {
            return Err(MonitorError::InvalidFormat("Invalid row magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(MonitorError::InvalidFormat(format!(
                "Unsupported log version: {}",
                version[0]
            )));
        }

        let mut _flags = [0u8; 1];
        file.read_exact(&mut _flags)?;

        let mut seq_bytes = [0u8; 8];
        file.read_exact(&mut seq_bytes)?;
        let sequence = SequenceId(u64::from_le_bytes(seq_bytes));

        let mut ts_bytes = [0u8; 8];
        file.read_exact(&mut ts_bytes)?;
        let observed_at = micros_to_datetime(i64::from_le_bytes(ts_bytes))?;

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let payload_len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; payload_len];
        file.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&payload);

        if stored != computed {
            return Err(MonitorError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(Row {
            sequence,
            observed_at,
            payload,
        })
    }

    /// Current committed size.
    pub fn size(&self) -> u64 {
        *self.file_size.read()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk the log headers without decoding payloads.
    ///
    /// Stops at the first incomplete or unrecognizable row and reports the
    /// committed size up to that point.
    fn scan(file: &File, disk_size: u64) -> Result<(Vec<RowInfo>, u64)> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(0))?;

        let mut rows = Vec::new();
        let mut offset = 0u64;

        while offset + ROW_HEADER_SIZE <= disk_size {
            let mut magic = [0u8; 4];
            if file.read_exact(&mut magic).is_err() || &magic != ROW_MAGIC {
                break;
            }

            let mut version_flags = [0u8; 2];
            file.read_exact(&mut version_flags)?;
            if version_flags[0] != LOG_VERSION {
                break;
            }

            let mut seq_bytes = [0u8; 8];
            file.read_exact(&mut seq_bytes)?;
            let sequence = SequenceId(u64::from_le_bytes(seq_bytes));

            let mut ts_bytes = [0u8; 8];
            file.read_exact(&mut ts_bytes)?;
            let observed_at = micros_to_datetime(i64::from_le_bytes(ts_bytes))?;

            let mut len_bytes = [0u8; 4];
            file.read_exact(&mut len_bytes)?;
            let payload_len = u32::from_le_bytes(len_bytes) as u64;

            // Payload + checksum must be fully present, otherwise the row
            // is a torn tail.
            let row_end = offset + ROW_HEADER_SIZE + payload_len + 4;
            if row_end > disk_size {
                break;
            }
            file.seek(SeekFrom::Current(payload_len as i64 + 4))?;

            rows.push(RowInfo {
                sequence,
                observed_at,
                offset,
            });
            offset = row_end;
        }

        Ok((rows, offset))
    }
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| MonitorError::Corruption(format!("Invalid row timestamp: {}", micros)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let dir = TempDir::new().unwrap();
        let (log, rows) = SnapshotLog::open(dir.path().join("snapshots.log")).unwrap();
        assert!(rows.is_empty());

        let now = Utc::now();
        let offset = log.append(SequenceId(1), now, b"payload").unwrap();
        assert_eq!(offset, 0);

        let row = log.read_at(offset).unwrap();
        assert_eq!(row.sequence, SequenceId(1));
        assert_eq!(row.payload, b"payload");
        // Microsecond precision survives the round-trip.
        assert_eq!(row.observed_at.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_scan_recovers_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshots.log");

        {
            let (log, _) = SnapshotLog::open(&path).unwrap();
            for i in 1..=5u64 {
                log.append(SequenceId(i), Utc::now(), format!("row {}", i).as_bytes())
                    .unwrap();
            }
        }

        let (log, rows) = SnapshotLog::open(&path).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].sequence, SequenceId(1));
        assert_eq!(rows[4].sequence, SequenceId(5));

        let row = log.read_at(rows[2].offset).unwrap();
        assert_eq!(row.payload, b"row 3");
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshots.log");

        let good_size;
        {
            let (log, _) = SnapshotLog::open(&path).unwrap();
            log.append(SequenceId(1), Utc::now(), b"good row").unwrap();
            good_size = log.size();
        }

        // Simulate a crash mid-append: a second row header with no payload.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(ROW_MAGIC).unwrap();
            file.write_all(&[LOG_VERSION, 0]).unwrap();
            file.write_all(&2u64.to_le_bytes()).unwrap();
            file.write_all(&Utc::now().timestamp_micros().to_le_bytes())
                .unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(b"trunc").unwrap();
        }

        let (log, rows) = SnapshotLog::open(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(log.size(), good_size);

        // The next append lands cleanly after the surviving row.
        let offset = log.append(SequenceId(2), Utc::now(), b"after recovery").unwrap();
        assert_eq!(offset, good_size);

        let (_, rows) = SnapshotLog::open(&path).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_corrupt_payload_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshots.log");

        let offset;
        {
            let (log, _) = SnapshotLog::open(&path).unwrap();
            offset = log.append(SequenceId(1), Utc::now(), b"payload").unwrap();
        }

        // Flip a payload byte in place.
        {
            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(ROW_HEADER_SIZE)).unwrap();
            file.write_all(b"X").unwrap();
        }

        let (log, _) = SnapshotLog::open(&path).unwrap();
        let result = log.read_at(offset);
        assert!(matches!(
            result,
            Err(MonitorError::ChecksumMismatch { .. })
        ));
    }
}
