//! Snapshot store: append-only persistence of observation history.
//!
//! One directory per store: a `MANIFEST` identifying the format, a `LOCK`
//! file for process exclusion, and `snapshots.log` holding framed rows.
//! The index over rows lives in memory and is rebuilt from a log scan on
//! open. Rows are never updated or deleted; retention is an external
//! concern.

mod index;
mod log;

pub use log::{Row, RowInfo, SnapshotLog};

use crate::config::WatchConfig;
use crate::error::{MonitorError, Result};
use crate::types::{
    ChangeSet, ObservedState, SequenceId, Snapshot, SnapshotDetail, SnapshotSummary,
};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use index::SnapshotIndex;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::info;

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"DWM\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// On-disk row payload. Sequence id and observation time live in the row
/// header, everything else here.
#[derive(Serialize, Deserialize)]
struct RowPayload {
    state: ObservedState,
    change_set: ChangeSet,
    explanation: String,
}

/// Append-only store of state snapshots.
pub struct SnapshotStore {
    /// Lock file for exclusive access.
    _lock_file: File,

    /// Row log.
    log: SnapshotLog,

    /// Sequence index, rebuilt on open.
    index: SnapshotIndex,

    /// LRU cache of decoded states. Detail reads decode two rows; repeat
    /// reads of recent snapshots stay off disk.
    state_cache: Mutex<LruCache<SequenceId, ObservedState>>,

    /// Serializes appends.
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: &WatchConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(MonitorError::InvalidFormat(format!(
                "Store not found at {}",
                config.path.display()
            )))
        }
    }

    /// Create a new store.
    pub fn create(config: &WatchConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        Self::init(config)
    }

    /// Open an existing store.
    pub fn open(config: &WatchConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        Self::init(config)
    }

    fn init(config: &WatchConfig) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.path)?;

        let (log, rows) = SnapshotLog::open(config.path.join("snapshots.log"))?;
        let index = SnapshotIndex::from_rows(&rows);

        let cache_size = NonZeroUsize::new(config.state_cache_size.max(1)).unwrap();

        Ok(Self {
            _lock_file: lock_file,
            log,
            index,
            state_cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
        })
    }

    // --- Write path ---

    /// Durably persist a new snapshot, returning its assigned sequence id.
    ///
    /// The row becomes visible to readers only once it is fully on disk;
    /// on any failure the store is unchanged.
    pub fn append(
        &self,
        state: ObservedState,
        change_set: ChangeSet,
        explanation: String,
    ) -> Result<SequenceId> {
        let _lock = self.write_lock.lock();

        let sequence = self.index.next_sequence();
        let observed_at = Utc::now();

        let payload = rmp_serde::to_vec(&RowPayload {
            state,
            change_set,
            explanation,
        })?;

        let offset = self.log.append(sequence, observed_at, &payload)?;
        self.index.add(sequence, observed_at, offset);

        info!(
            sequence = sequence.0,
            bytes = payload.len(),
            "appended snapshot"
        );

        Ok(sequence)
    }

    // --- Read paths ---

    /// State of the highest-sequence snapshot, or `None` for an empty store.
    /// This is the read path used before every reconciliation.
    pub fn latest_state(&self) -> Result<Option<ObservedState>> {
        match self.index.latest() {
            Some((sequence, offset)) => Ok(Some(self.load_state(sequence, offset)?)),
            None => Ok(None),
        }
    }

    /// Full latest snapshot (debugging/inspection helper).
    pub fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let Some((sequence, offset)) = self.index.latest() else {
            return Ok(None);
        };

        let (observed_at, payload) = self.load_payload(offset)?;
        Ok(Some(Snapshot {
            sequence_id: sequence,
            observed_at,
            state: payload.state,
            change_set: payload.change_set,
            explanation: payload.explanation,
        }))
    }

    /// All snapshot summaries, observed_at descending (ties: sequence id
    /// descending).
    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        self.index.summaries()
    }

    /// Full detail of one snapshot, including the state of the immediately
    /// preceding snapshot. `None` if the sequence id does not exist.
    pub fn detail(&self, sequence: SequenceId) -> Result<Option<SnapshotDetail>> {
        let Some(offset) = self.index.offset_of(sequence) else {
            return Ok(None);
        };

        let (observed_at, payload) = self.load_payload(offset)?;

        let previous_state = match self.index.previous_of(sequence) {
            Some((prev_sequence, prev_offset)) => {
                Some(self.load_state(prev_sequence, prev_offset)?)
            }
            None => None,
        };

        Ok(Some(SnapshotDetail {
            sequence_id: sequence,
            observed_at,
            change_set: payload.change_set,
            explanation: payload.explanation,
            current_state: payload.state,
            previous_state,
        }))
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // --- Internals ---

    fn load_payload(&self, offset: u64) -> Result<(DateTime<Utc>, RowPayload)> {
        let row = self.log.read_at(offset)?;
        let payload: RowPayload = rmp_serde::from_slice(&row.payload)?;
        Ok((row.observed_at, payload))
    }

    fn load_state(&self, sequence: SequenceId, offset: u64) -> Result<ObservedState> {
        if let Some(state) = self.state_cache.lock().get(&sequence) {
            return Ok(state.clone());
        }

        let (_, payload) = self.load_payload(offset)?;
        self.state_cache.lock().put(sequence, payload.state.clone());
        Ok(payload.state)
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| MonitorError::Locked)?;

        Ok(lock_file)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(MonitorError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(MonitorError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }
}
