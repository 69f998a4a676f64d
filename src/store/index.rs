//! In-memory snapshot index.
//!
//! Maps sequence ids to row offsets and caches summaries. Rebuilt from the
//! log scan on open; not persisted.

use crate::store::log::RowInfo;
use crate::types::{SequenceId, SnapshotSummary};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug)]
struct Entry {
    offset: u64,
    observed_at: DateTime<Utc>,
}

/// Index over committed snapshot rows.
pub struct SnapshotIndex {
    entries: RwLock<BTreeMap<SequenceId, Entry>>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuild from the rows recovered by the open-time log scan.
    pub fn from_rows(rows: &[RowInfo]) -> Self {
        let index = Self::new();
        for row in rows {
            index.add(row.sequence, row.observed_at, row.offset);
        }
        index
    }

    /// Publish a committed row. Called only after the row is fully on disk.
    pub fn add(&self, sequence: SequenceId, observed_at: DateTime<Utc>, offset: u64) {
        self.entries.write().insert(
            sequence,
            Entry {
                offset,
                observed_at,
            },
        );
    }

    /// Next sequence id to assign.
    pub fn next_sequence(&self) -> SequenceId {
        self.entries
            .read()
            .keys()
            .next_back()
            .copied()
            .map(SequenceId::next)
            .unwrap_or(SequenceId(1))
    }

    /// Offset of a row, if it exists.
    pub fn offset_of(&self, sequence: SequenceId) -> Option<u64> {
        self.entries.read().get(&sequence).map(|e| e.offset)
    }

    /// Highest-sequence row.
    pub fn latest(&self) -> Option<(SequenceId, u64)> {
        self.entries
            .read()
            .iter()
            .next_back()
            .map(|(seq, e)| (*seq, e.offset))
    }

    /// Row with the greatest sequence id strictly below the given one.
    pub fn previous_of(&self, sequence: SequenceId) -> Option<(SequenceId, u64)> {
        self.entries
            .read()
            .range(..sequence)
            .next_back()
            .map(|(seq, e)| (*seq, e.offset))
    }

    /// All summaries, observed_at descending, ties broken by sequence id
    /// descending.
    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        let mut summaries: Vec<SnapshotSummary> = self
            .entries
            .read()
            .iter()
            .map(|(seq, e)| SnapshotSummary {
                sequence_id: *seq,
                observed_at: e.observed_at,
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.observed_at
                .cmp(&a.observed_at)
                .then(b.sequence_id.cmp(&a.sequence_id))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_next_sequence_starts_at_one() {
        let index = SnapshotIndex::new();
        assert_eq!(index.next_sequence(), SequenceId(1));

        index.add(SequenceId(1), at(100), 0);
        assert_eq!(index.next_sequence(), SequenceId(2));
    }

    #[test]
    fn test_previous_of() {
        let index = SnapshotIndex::new();
        index.add(SequenceId(1), at(100), 0);
        index.add(SequenceId(2), at(200), 64);
        index.add(SequenceId(3), at(300), 128);

        assert_eq!(index.previous_of(SequenceId(3)), Some((SequenceId(2), 64)));
        assert_eq!(index.previous_of(SequenceId(2)), Some((SequenceId(1), 0)));
        assert_eq!(index.previous_of(SequenceId(1)), None);
    }

    #[test]
    fn test_summaries_order() {
        let index = SnapshotIndex::new();
        index.add(SequenceId(1), at(100), 0);
        index.add(SequenceId(2), at(300), 64);
        // Same observation time as sequence 2: sequence breaks the tie.
        index.add(SequenceId(3), at(300), 128);

        let seqs: Vec<u64> = index.summaries().iter().map(|s| s.sequence_id.0).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
    }
}
