//! One versioned table.

use reldb_value::{Id, Record};
use std::collections::BTreeMap;

/// An undo entry: the pre-image of one row at one version.
#[derive(Debug, Clone)]
struct HistoryEntry {
    version: u64,
    id: Id,
    /// Row content before the write; `None` if the row did not exist.
    prev: Option<Record>,
}

/// A table with a monotonically versioned row map.
///
/// Every write increments the version and appends the pre-image of the
/// touched row to the history, so any earlier version can be restored
/// (`rollback_to`) or made permanent (`consolidate_to`).
#[derive(Debug, Default)]
pub struct VersionedTable {
    rows: BTreeMap<Id, Record>,
    history: Vec<HistoryEntry>,
    version: u64,
    next_id: Option<i64>,
}

impl VersionedTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current version. Strictly increases with every write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no live rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a row by identifier.
    #[must_use]
    pub fn get(&self, id: &Id) -> Option<&Record> {
        self.rows.get(id)
    }

    /// Iterates live rows in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = (&Id, &Record)> {
        self.rows.iter()
    }

    /// Inserts or overwrites a row. Returns the new version.
    pub fn put(&mut self, id: Id, record: Record) -> u64 {
        self.version += 1;
        let prev = self.rows.insert(id.clone(), record);
        self.history.push(HistoryEntry {
            version: self.version,
            id,
            prev,
        });
        self.version
    }

    /// Removes a row. Returns the removed record and the new version;
    /// deleting an absent row does not bump the version.
    pub fn delete(&mut self, id: &Id) -> Option<(Record, u64)> {
        let removed = self.rows.remove(id)?;
        self.version += 1;
        self.history.push(HistoryEntry {
            version: self.version,
            id: id.clone(),
            prev: Some(removed.clone()),
        });
        Some((removed, self.version))
    }

    /// Allocates the next integer identifier, seeding the counter to
    /// `max(existing) + 1` when first needed.
    pub fn allocate_id(&mut self) -> Id {
        let next = self.next_id.unwrap_or_else(|| {
            self.rows
                .keys()
                .filter_map(Id::as_int)
                .max()
                .map_or(1, |max| max + 1)
        });
        self.next_id = Some(next + 1);
        Id::Int(next)
    }

    /// Notes a caller-supplied identifier. The allocation counter is
    /// reset so it reseeds from the live rows on next use.
    pub fn note_explicit_id(&mut self) {
        self.next_id = None;
    }

    /// Restores rows and version counter to the state at `version`,
    /// discarding all later writes.
    pub fn rollback_to(&mut self, version: u64) {
        while self
            .history
            .last()
            .is_some_and(|entry| entry.version > version)
        {
            let entry = self.history.pop().expect("checked non-empty");
            match entry.prev {
                Some(record) => {
                    self.rows.insert(entry.id, record);
                }
                None => {
                    self.rows.remove(&entry.id);
                }
            }
        }
        self.version = version;
        self.next_id = None;
    }

    /// Folds history up to and including `version` into the base: those
    /// writes can no longer be rolled back.
    pub fn consolidate_to(&mut self, version: u64) {
        self.history.retain(|entry| entry.version > version);
    }

    /// Number of retained history entries.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
