//! At-most-once accounting of images.
//!
//! The in-memory set is a cache in front of the persisted history, which
//! stays the source of truth across restarts. A miss in memory falls back
//! to scanning the history; hits found there are backfilled so the next
//! lookup for the same identifier never touches storage.

use std::collections::HashSet;

use crate::models::History;

/// Result of a dedup lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    /// Not accounted anywhere yet.
    New,
    /// Found in the in-memory set.
    Cached,
    /// Found in the persisted history (and now cached).
    Persisted,
}

impl Seen {
    pub fn is_new(self) -> bool {
        self == Seen::New
    }
}

/// Identifiers already accounted during this process lifetime.
#[derive(Debug, Default)]
pub struct DedupGuard {
    processed: HashSet<String>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look `identifier` up without admitting it.
    ///
    /// Memory first; on a miss, every record of every plant in `history` is
    /// checked and a hit is backfilled into memory.
    pub fn check(&mut self, identifier: &str, history: &History) -> Seen {
        if self.processed.contains(identifier) {
            return Seen::Cached;
        }

        let persisted = history
            .values()
            .flatten()
            .flat_map(|block| block.images.iter())
            .any(|record| record.identifier == identifier);

        if persisted {
            self.processed.insert(identifier.to_string());
            Seen::Persisted
        } else {
            Seen::New
        }
    }

    /// Mark `identifier` as accounted.
    pub fn admit(&mut self, identifier: &str) {
        self.processed.insert(identifier.to_string());
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.processed.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
