//! Per-type entity repository.

use crate::adapter::{CompiledQuery, StoreAdapter};
use crate::database::Database;
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::resolve::ResolutionRules;
use reldb_query::{Cond, Params};
use reldb_value::{record_from_json, Id, Record, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed access to one entity type's rows.
///
/// A repository is a thin façade: conditions compile through the
/// database's AST cache, rows move through the backend adapter, and
/// entities convert via their [`Entity`] capabilities.
pub struct Repository<T: Entity> {
    db: Database,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }

    fn table() -> &'static str {
        &T::descriptor().table
    }

    /// The entity with the given identifier, materialized under `rules`
    /// (default: shallow).
    pub fn select_by_id(
        &self,
        id: impl Into<Id>,
        rules: Option<ResolutionRules>,
    ) -> CoreResult<Option<T>> {
        let id = id.into();
        let cond = self.db.cached_cond("#ID == ?")?;
        let query = CompiledQuery::new(cond, Params::new().push(Value::Id(id)));
        let rules = rules.unwrap_or_default();
        let rows = self
            .db
            .select(T::type_name(), Self::table(), &query, rules)?;
        rows.first().map(T::from_record).transpose()
    }

    /// Entities matching a condition.
    pub fn select(&self, cond: &Arc<Cond>, params: Params) -> CoreResult<Vec<T>> {
        self.select_with_rules(cond, params, ResolutionRules::default())
    }

    /// Entities matching a condition, materialized under `rules`.
    pub fn select_with_rules(
        &self,
        cond: &Arc<Cond>,
        params: Params,
        rules: ResolutionRules,
    ) -> CoreResult<Vec<T>> {
        let query = CompiledQuery::new(Arc::clone(cond), params);
        let rows = self
            .db
            .select(T::type_name(), Self::table(), &query, rules)?;
        rows.iter().map(T::from_record).collect()
    }

    /// Entities matching a query text. The text parses once; the AST is
    /// cached by the text.
    pub fn select_by_query(&self, text: &str, params: Params) -> CoreResult<Vec<T>> {
        let cond = self.db.cached_cond(text)?;
        self.select(&cond, params)
    }

    /// All entities.
    pub fn select_all(&self) -> CoreResult<Vec<T>> {
        let rows = self.db.select(
            T::type_name(),
            Self::table(),
            &CompiledQuery::all(),
            ResolutionRules::default(),
        )?;
        rows.iter().map(T::from_record).collect()
    }

    /// Number of entities matching a condition, or all when `None`.
    pub fn count(&self, cond: Option<&Arc<Cond>>, params: Params) -> CoreResult<usize> {
        let query = match cond {
            Some(cond) => CompiledQuery::new(Arc::clone(cond), params),
            None => CompiledQuery::all(),
        };
        self.db.count(T::type_name(), Self::table(), &query)
    }

    /// Number of entities matching a query text.
    pub fn count_by_query(&self, text: &str, params: Params) -> CoreResult<usize> {
        let cond = self.db.cached_cond(text)?;
        self.count(Some(&cond), params)
    }

    /// Stores an entity, allocating an identifier when it has none and
    /// writing it back. Nested unstored entities are stored first;
    /// relationship lists are diffed against the previous row.
    pub fn store(&self, entity: &mut T) -> CoreResult<Id> {
        let record = entity.to_record()?;
        let id = self.db.insert(T::type_name(), Self::table(), record)?;
        entity.set_id(Value::Id(id.clone()))?;
        Ok(id)
    }

    /// Reconstructs an entity from a JSON map (field names resolved
    /// case-insensitively, nested sub-entities by identifier or by
    /// nested map), stores it, and returns the stored entity.
    pub fn store_from_json(&self, json: &serde_json::Value) -> CoreResult<T> {
        let external = record_from_json(json)?;
        let row = {
            // Coercion is schema-driven; the adapter only sees a typed row.
            let registry = self.db.registry();
            let registry = registry.read();
            registry.build_row(Self::table(), &external)?
        };
        let id = self.db.insert(T::type_name(), Self::table(), row)?;
        Ok(self
            .select_by_id(id, None)?
            .expect("row stored by this call"))
    }

    /// Deletes entities matching a condition, enforcing referential
    /// integrity. Returns the deleted entities.
    pub fn delete(&self, cond: &Arc<Cond>, params: Params) -> CoreResult<Vec<T>> {
        let query = CompiledQuery::new(Arc::clone(cond), params);
        let rows = self.db.delete(T::type_name(), Self::table(), &query)?;
        rows.iter().map(T::from_record).collect()
    }

    /// Deletes entities matching a query text.
    pub fn delete_by_query(&self, text: &str, params: Params) -> CoreResult<Vec<T>> {
        let cond = self.db.cached_cond(text)?;
        self.delete(&cond, params)
    }

    /// Cascade-deletes an entity: a transaction removes the entity, its
    /// relationship rows, rows referencing it, and referenced rows left
    /// unreferenced. Returns `(table, row)` pairs in deletion order.
    pub fn delete_entity_cascade(&self, entity: &T) -> CoreResult<Vec<(String, Record)>> {
        let Value::Id(id) = entity.id() else {
            return Ok(Vec::new());
        };
        self.db.delete_cascade(T::type_name(), Self::table(), &id)
    }

    /// Number of stored entities.
    pub fn len(&self) -> CoreResult<usize> {
        self.count(None, Params::new())
    }

    /// True when no entities are stored.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// True if an entity with the identifier exists.
    pub fn exists_id(&self, id: impl Into<Id>) -> CoreResult<bool> {
        Ok(self
            .select_by_id(id, Some(ResolutionRules::ids_only()))?
            .is_some())
    }
}
