//! The versioned table store.

mod table;

pub use table::VersionedTable;

use crate::error::{CoreError, CoreResult};
use crate::schema::SchemaRegistry;
use reldb_value::{Id, Record};
use std::collections::HashMap;

/// A snapshot of every table's version at a moment in time.
pub type Snapshot = HashMap<String, u64>;

/// All tables of the store.
///
/// Tables spring into existence on first write, but only for registered
/// schemas and derived relationship tables; anything else fails with
/// `UnknownTable`.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: HashMap<String, VersionedTable>,
}

impl TableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table if it does not exist yet, without the
    /// schema gate. Used when tables are generated up front.
    pub fn ensure_table(&mut self, name: &str) {
        self.tables.entry(name.to_string()).or_default();
    }

    /// The table, creating it when the registry knows the name.
    pub fn table_mut(
        &mut self,
        registry: &SchemaRegistry,
        name: &str,
    ) -> CoreResult<&mut VersionedTable> {
        if !self.tables.contains_key(name) {
            if !registry.is_table_known(name) {
                return Err(CoreError::unknown_table(name));
            }
            self.tables.insert(name.to_string(), VersionedTable::new());
        }
        Ok(self.tables.get_mut(name).expect("just inserted"))
    }

    /// Inserts or overwrites a row. Returns the new table version.
    pub fn put(
        &mut self,
        registry: &SchemaRegistry,
        table: &str,
        id: Id,
        record: Record,
    ) -> CoreResult<u64> {
        Ok(self.table_mut(registry, table)?.put(id, record))
    }

    /// Returns a row.
    #[must_use]
    pub fn get(&self, table: &str, id: &Id) -> Option<&Record> {
        self.tables.get(table)?.get(id)
    }

    /// Iterates the rows of a table. Absent tables iterate as empty.
    pub fn entries<'a>(&'a self, table: &str) -> Box<dyn Iterator<Item = (&'a Id, &'a Record)> + 'a> {
        match self.tables.get(table) {
            Some(t) => Box::new(t.entries()),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Removes a row; referential integrity is the resolver's concern and
    /// is checked before this is called.
    pub fn delete(
        &mut self,
        registry: &SchemaRegistry,
        table: &str,
        id: &Id,
    ) -> CoreResult<Option<Record>> {
        Ok(self
            .table_mut(registry, table)?
            .delete(id)
            .map(|(record, _)| record))
    }

    /// Number of live rows in a table.
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, VersionedTable::len)
    }

    /// True if no tables exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Allocates the next identifier for a table.
    pub fn allocate_id(&mut self, registry: &SchemaRegistry, table: &str) -> CoreResult<Id> {
        Ok(self.table_mut(registry, table)?.allocate_id())
    }

    /// The current per-table version vector.
    #[must_use]
    pub fn versions(&self) -> Snapshot {
        self.tables
            .iter()
            .map(|(name, table)| (name.clone(), table.version()))
            .collect()
    }

    /// Folds history up to the snapshot's versions into each table's base.
    pub fn consolidate(&mut self, snapshot: &Snapshot) {
        for (name, version) in snapshot {
            if let Some(table) = self.tables.get_mut(name) {
                table.consolidate_to(*version);
            }
        }
    }

    /// Restores every table to its version in the snapshot. Tables
    /// created after the snapshot roll back to version 0 (empty).
    pub fn rollback(&mut self, snapshot: &Snapshot) {
        for (name, table) in &mut self.tables {
            let version = snapshot.get(name).copied().unwrap_or(0);
            if table.version() > version {
                table.rollback_to(version);
            }
        }
    }
}
