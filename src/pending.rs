//! Buffering of half-received capture pairs.
//!
//! The two images of one capture round can arrive out of order and
//! interleaved with unrelated traffic, so records wait here keyed by group
//! id until their partner shows up. Memory stays bounded: a new First image
//! evicts every other group that is still waiting with only a First image
//! (an orphan whose Second never came).
//!
//! An entry never holds two records for the same position. A repeated
//! position for a group replaces the earlier record, so the newest capture
//! of an angle wins, the same rule orphan eviction applies across groups.

use std::collections::BTreeMap;

use crate::identifier::PairKey;
use crate::models::{ImageRecord, Position};

/// Outcome of adding one record to the buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum PairProgress {
    /// The group is still waiting for its partner.
    Pending,
    /// Both positions are present: First, then Second.
    Complete([ImageRecord; 2]),
}

/// What [`PendingPairBuffer::add`] did besides storing the record.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub progress: PairProgress,
    /// Group ids of orphan entries discarded to make room.
    pub evicted: Vec<String>,
    /// Earlier record of the same group and position that was replaced.
    pub replaced: Option<ImageRecord>,
}

/// Group id to the records received so far for that group.
#[derive(Debug, Clone, Default)]
pub struct PendingPairBuffer {
    entries: BTreeMap<String, Vec<(Position, ImageRecord)>>,
}

impl PendingPairBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under `key`, completing the pair when possible.
    pub fn add(&mut self, key: &PairKey, record: ImageRecord) -> AddOutcome {
        let evicted = if key.position == Position::First {
            self.evict_orphans(&key.group_id)
        } else {
            Vec::new()
        };

        let entry = self.entries.entry(key.group_id.clone()).or_default();
        let replaced = match entry.iter().position(|(p, _)| *p == key.position) {
            Some(idx) => Some(entry.remove(idx).1),
            None => None,
        };
        entry.push((key.position, record));

        let progress = if entry.len() == 2 {
            let mut pair = self.entries.remove(&key.group_id).unwrap_or_default();
            pair.sort_by_key(|(position, _)| *position);
            let mut records = pair.into_iter().map(|(_, record)| record);
            match (records.next(), records.next()) {
                (Some(first), Some(second)) => PairProgress::Complete([first, second]),
                _ => PairProgress::Pending,
            }
        } else {
            PairProgress::Pending
        };

        AddOutcome {
            progress,
            evicted,
            replaced,
        }
    }

    /// Drop every other group that is waiting with a lone First record.
    fn evict_orphans(&mut self, keep: &str) -> Vec<String> {
        let orphans: Vec<String> = self
            .entries
            .iter()
            .filter(|(group, records)| {
                group.as_str() != keep
                    && records.len() == 1
                    && records[0].0 == Position::First
            })
            .map(|(group, _)| group.clone())
            .collect();

        for group in &orphans {
            self.entries.remove(group);
        }
        orphans
    }

    /// Number of groups waiting for a partner.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
