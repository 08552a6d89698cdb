//! Backend adapter contract.
//!
//! The repository layer talks to a backend only through [`StoreAdapter`],
//! so the in-memory engine and an external relational driver are
//! interchangeable. The in-memory [`crate::Database`] implements the
//! contract; connection management for remote backends lives in
//! [`crate::ConnectionPool`].

use crate::error::CoreResult;
use crate::resolve::ResolutionRules;
use reldb_query::{Cond, Params};
use reldb_value::{Id, Record};
use std::sync::Arc;

/// A condition compiled for a backend: the parsed AST plus its bound
/// parameters. An absent condition matches every row.
#[derive(Debug, Clone, Default)]
pub struct CompiledQuery {
    /// Parsed condition; `None` matches all rows.
    pub cond: Option<Arc<Cond>>,
    /// Bound parameter values.
    pub params: Params,
}

impl CompiledQuery {
    /// A query matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A query from a condition and its parameters.
    #[must_use]
    pub fn new(cond: Arc<Cond>, params: Params) -> Self {
        Self {
            cond: Some(cond),
            params,
        }
    }
}

/// Operations a backend provides per entity type.
///
/// `entity` is the entity type name, `table` its backing table; a real
/// relational driver uses them to address prepared statements, the
/// in-memory engine mostly the table.
pub trait StoreAdapter: Send + Sync {
    /// Counts rows matching a query.
    fn count(&self, entity: &str, table: &str, query: &CompiledQuery) -> CoreResult<usize>;

    /// Selects rows matching a query, materialized under the given rules.
    fn select(
        &self,
        entity: &str,
        table: &str,
        query: &CompiledQuery,
        rules: ResolutionRules,
    ) -> CoreResult<Vec<Record>>;

    /// Inserts a row (resolving nested entities), returning its
    /// identifier.
    fn insert(&self, entity: &str, table: &str, record: Record) -> CoreResult<Id>;

    /// Overwrites an existing row. Whether an absent row is inserted
    /// instead is governed by the backend's auto-insert configuration.
    fn update(&self, entity: &str, table: &str, record: Record) -> CoreResult<Id>;

    /// Deletes rows matching a query, enforcing referential integrity.
    /// Returns the deleted rows.
    fn delete(&self, entity: &str, table: &str, query: &CompiledQuery) -> CoreResult<Vec<Record>>;

    /// Cascade-deletes one row and its reference closure inside a
    /// transaction. Returns `(table, row)` pairs in deletion order.
    fn delete_cascade(
        &self,
        entity: &str,
        table: &str,
        id: &Id,
    ) -> CoreResult<Vec<(String, Record)>>;

    /// Inserts one relationship row, reusing an identical existing row's
    /// identifier.
    fn insert_relationship(&self, rel_table: &str, source: &Id, target: &Id) -> CoreResult<Id>;
}
