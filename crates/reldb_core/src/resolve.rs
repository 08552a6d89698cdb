//! Relationship resolution and store-time validation.

use crate::error::{ConstraintKind, CoreError, CoreResult};
use crate::schema::{self, FieldType, Relationship, SchemaRegistry};
use crate::store::TableStore;
use regex::Regex;
use reldb_value::{Id, Record, Value};
use tracing::debug;

/// Caller-supplied flags controlling read-time traversal.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRules {
    /// How many reference levels to materialize. `0` leaves foreign keys
    /// as identifiers.
    pub depth: usize,
    /// Also materialize list-of-reference fields through their
    /// relationship tables.
    pub eager_all: bool,
}

impl Default for ResolutionRules {
    fn default() -> Self {
        Self {
            depth: 1,
            eager_all: false,
        }
    }
}

impl ResolutionRules {
    /// Leave all references as identifiers.
    #[must_use]
    pub const fn ids_only() -> Self {
        Self {
            depth: 0,
            eager_all: false,
        }
    }

    /// Materialize inline foreign keys and relationship fields.
    #[must_use]
    pub const fn eager_all() -> Self {
        Self {
            depth: usize::MAX,
            eager_all: true,
        }
    }

    fn descend(self) -> Self {
        Self {
            depth: self.depth.saturating_sub(1),
            ..self
        }
    }
}

/// Resolves references against the store and enforces row constraints.
pub(crate) struct Resolver<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Target identifiers of a relationship field for one source row, in
    /// relationship-row order.
    pub(crate) fn related_ids(
        &self,
        store: &TableStore,
        rel: &Relationship,
        source_id: &Id,
    ) -> Vec<Id> {
        let mut rows: Vec<(&Id, &Record)> = store
            .entries(&rel.table)
            .filter(|(_, row)| {
                row.get(&rel.source_column)
                    .and_then(Value::as_id)
                    .is_some_and(|id| id == source_id)
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| a.cmp(b));
        rows.iter()
            .filter_map(|(_, row)| row.get(&rel.target_column).and_then(Value::as_id).cloned())
            .collect()
    }

    /// Materializes references on a row read.
    ///
    /// `Ref` fields holding an identifier are substituted with the target
    /// row (recursively, up to `rules.depth`); dangling targets stay as
    /// bare identifiers. `RefList` fields always gain their identifier
    /// list; under `eager_all` they carry the materialized rows instead,
    /// again with dangling targets as identifiers.
    pub(crate) fn materialize(
        &self,
        store: &TableStore,
        table: &str,
        mut record: Record,
        rules: ResolutionRules,
    ) -> Record {
        let Some(descriptor) = self.registry.descriptor(table) else {
            return record;
        };
        for field in &descriptor.fields {
            match &field.ty {
                FieldType::Ref(_) => {
                    if rules.depth == 0 {
                        continue;
                    }
                    let Some(Value::Id(id)) = record.get(&field.name).cloned() else {
                        continue;
                    };
                    let Some(reference) = self.registry.reference(table, &field.name) else {
                        continue;
                    };
                    if let Some(target) = store.get(&reference.target_table, &id) {
                        let nested = self.materialize(
                            store,
                            &reference.target_table,
                            target.clone(),
                            rules.descend(),
                        );
                        record.set(field.name.clone(), Value::Record(nested));
                    }
                }
                FieldType::RefList(_) => {
                    let Some(rel) = self.registry.relationship(table, &field.name) else {
                        continue;
                    };
                    let Some(Value::Id(source_id)) = record.get(&descriptor.id_field).cloned()
                    else {
                        continue;
                    };
                    let ids = self.related_ids(store, &rel, &source_id);
                    if rules.eager_all {
                        let items = ids
                            .into_iter()
                            .map(|id| match store.get(&rel.target_table, &id) {
                                Some(target) => Value::Record(self.materialize(
                                    store,
                                    &rel.target_table,
                                    target.clone(),
                                    rules.descend(),
                                )),
                                // Dangling references stay observable.
                                None => Value::Id(id),
                            })
                            .collect();
                        record.set(field.name.clone(), Value::List(items));
                    } else {
                        record.set(field.name.clone(), Value::IdList(ids));
                    }
                }
                _ => {}
            }
        }
        record
    }

    /// Stores a row, resolving nested entities depth-first and diffing
    /// relationship rows. Returns the row's identifier.
    pub(crate) fn store_record(
        &self,
        store: &mut TableStore,
        table: &str,
        mut record: Record,
    ) -> CoreResult<Id> {
        let descriptor = self
            .registry
            .descriptor(table)
            .ok_or_else(|| CoreError::unknown_table(table))?
            .clone();

        // Relationship fields never live in the row itself.
        let mut rel_updates: Vec<(Relationship, Vec<Id>)> = Vec::new();
        for field in &descriptor.fields {
            if !field.ty.is_ref_list() {
                continue;
            }
            let value = record.remove(&field.name);
            let Some(rel) = self.registry.relationship(table, &field.name) else {
                continue;
            };
            let targets = match value {
                None | Some(Value::Null) => continue,
                Some(Value::IdList(ids)) => ids,
                Some(Value::List(items)) => {
                    let mut ids = Vec::with_capacity(items.len());
                    for item in items {
                        ids.push(self.target_id(store, &rel, item)?);
                    }
                    ids
                }
                Some(Value::Records(rows)) => {
                    let mut ids = Vec::with_capacity(rows.len());
                    for row in rows {
                        ids.push(self.nested_store(store, &rel.target_table, row)?);
                    }
                    ids
                }
                Some(other) => {
                    return Err(CoreError::field_invalid(
                        ConstraintKind::Type,
                        table,
                        &field.name,
                        &other,
                    ))
                }
            };
            rel_updates.push((rel, targets));
        }

        // Unstored nested entities go in first, depth first.
        for field in &descriptor.fields {
            if !matches!(field.ty, FieldType::Ref(_)) {
                continue;
            }
            if let Some(Value::Record(nested)) = record.get(&field.name).cloned() {
                let reference = self
                    .registry
                    .reference(table, &field.name)
                    .ok_or_else(|| CoreError::field_not_found(table, &field.name))?;
                let id = self.nested_store(store, &reference.target_table, nested)?;
                record.set(field.name.clone(), Value::Id(id));
            }
        }

        // Identifier: keep a caller-supplied one, allocate otherwise.
        let id = match record.get(&descriptor.id_field) {
            Some(Value::Id(id)) => {
                let id = id.clone();
                store.table_mut(self.registry, table)?.note_explicit_id();
                id
            }
            Some(Value::Int(n)) => {
                let id = Id::Int(*n);
                store.table_mut(self.registry, table)?.note_explicit_id();
                id
            }
            None | Some(Value::Null) => store.allocate_id(self.registry, table)?,
            Some(other) => {
                return Err(CoreError::field_invalid(
                    ConstraintKind::Type,
                    table,
                    &descriptor.id_field,
                    other,
                ))
            }
        };
        record.set(descriptor.id_field.clone(), Value::Id(id.clone()));

        // Normalize scalar representations to the declared field types.
        for field in &descriptor.fields {
            if field.ty.is_ref_list() {
                continue;
            }
            if let Some(value) = record.get(&field.name).filter(|v| !v.is_null()).cloned() {
                record.set(field.name.clone(), schema::coerce(table, field, value)?);
            }
        }

        self.validate(store, table, &record, &id)?;
        store.put(self.registry, table, id.clone(), record)?;

        for (rel, targets) in rel_updates {
            self.diff_relationship(store, &rel, &id, targets)?;
        }

        Ok(id)
    }

    /// Stores a nested entity row unless its identifier already exists in
    /// the target table.
    fn nested_store(&self, store: &mut TableStore, table: &str, row: Record) -> CoreResult<Id> {
        let id_field = self
            .registry
            .id_field(table)
            .ok_or_else(|| CoreError::unknown_table(table))?;
        if let Some(Value::Id(id)) = row.get(id_field) {
            if store.get(table, id).is_some() {
                return Ok(id.clone());
            }
        }
        self.store_record(store, table, row)
    }

    fn target_id(
        &self,
        store: &mut TableStore,
        rel: &Relationship,
        item: Value,
    ) -> CoreResult<Id> {
        match item {
            Value::Id(id) => Ok(id),
            Value::Int(n) => Ok(Id::Int(n)),
            Value::Record(row) => self.nested_store(store, &rel.target_table, row),
            other => Err(CoreError::field_invalid(
                ConstraintKind::Type,
                &rel.source_table,
                &rel.field,
                &other,
            )),
        }
    }

    /// Brings the relationship table in line with the desired target set:
    /// new targets gain rows, removed targets lose theirs, and an
    /// identical row is reused rather than duplicated.
    fn diff_relationship(
        &self,
        store: &mut TableStore,
        rel: &Relationship,
        source_id: &Id,
        targets: Vec<Id>,
    ) -> CoreResult<()> {
        let existing: Vec<(Id, Id)> = store
            .entries(&rel.table)
            .filter_map(|(row_id, row)| {
                let source = row.get(&rel.source_column)?.as_id()?;
                let target = row.get(&rel.target_column)?.as_id()?;
                (source == source_id).then(|| (row_id.clone(), target.clone()))
            })
            .collect();

        for (row_id, target) in &existing {
            if !targets.contains(target) {
                store.delete(self.registry, &rel.table, row_id)?;
            }
        }
        for target in targets {
            if existing.iter().any(|(_, t)| *t == target) {
                continue;
            }
            let row_id = store.allocate_id(self.registry, &rel.table)?;
            let mut row = Record::new();
            row.set(rel.source_column.clone(), Value::Id(source_id.clone()));
            row.set(rel.target_column.clone(), Value::Id(target));
            store.put(self.registry, &rel.table, row_id, row)?;
        }
        Ok(())
    }

    /// Enforces field constraints before a row is written.
    fn validate(
        &self,
        store: &TableStore,
        table: &str,
        record: &Record,
        own_id: &Id,
    ) -> CoreResult<()> {
        let descriptor = self
            .registry
            .descriptor(table)
            .ok_or_else(|| CoreError::unknown_table(table))?;
        for field in &descriptor.fields {
            if field.ty.is_ref_list() {
                continue;
            }
            let value = record.get(&field.name);
            let missing = value.map_or(true, Value::is_null);
            if field.required && missing {
                return Err(CoreError::field_invalid(
                    ConstraintKind::Required,
                    table,
                    &field.name,
                    &Value::Null,
                ));
            }
            let Some(value) = value.filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(limit) = field.max_length {
                if value.as_text().is_some_and(|s| s.chars().count() > limit) {
                    return Err(CoreError::field_invalid(
                        ConstraintKind::Maximum,
                        table,
                        &field.name,
                        value,
                    ));
                }
            }
            if let (Some(pattern), Some(text)) = (&field.pattern, value.as_text()) {
                let regex = Regex::new(pattern).map_err(|_| {
                    CoreError::field_invalid(ConstraintKind::Regexp, table, &field.name, value)
                })?;
                if !regex.is_match(text) {
                    return Err(CoreError::field_invalid(
                        ConstraintKind::Regexp,
                        table,
                        &field.name,
                        value,
                    ));
                }
            }
            // Type and enum-range conformance share the coercion rules.
            schema::coerce(table, field, value.clone())?;
            if field.unique {
                let clash = store.entries(table).any(|(id, row)| {
                    id != own_id && row.get(&field.name).is_some_and(|v| v.loose_eq(value))
                });
                if clash {
                    return Err(CoreError::field_invalid(
                        ConstraintKind::Unique,
                        table,
                        &field.name,
                        value,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Deletes a row after proving no other row holds a foreign key to it.
    pub(crate) fn delete_checked(
        &self,
        store: &mut TableStore,
        table: &str,
        id: &Id,
    ) -> CoreResult<Option<Record>> {
        self.ensure_unreferenced(store, table, id)?;
        store.delete(self.registry, table, id)
    }

    /// Fails with `DeleteConstraint` if any row (including relationship
    /// rows) references `table.#id`.
    fn ensure_unreferenced(&self, store: &TableStore, table: &str, id: &Id) -> CoreResult<()> {
        for source_table in self.registry.tables() {
            for reference in self.registry.references(source_table) {
                if reference.target_table != table {
                    continue;
                }
                for (row_id, row) in store.entries(source_table) {
                    if row
                        .get(&reference.field)
                        .and_then(Value::as_id)
                        .is_some_and(|v| v == id)
                    {
                        return Err(CoreError::delete_constraint(
                            source_table,
                            row_id,
                            &reference.field,
                            id,
                        ));
                    }
                }
            }
            for rel in self.registry.relationships(source_table) {
                for (column, end_table) in [
                    (&rel.source_column, &rel.source_table),
                    (&rel.target_column, &rel.target_table),
                ] {
                    if end_table != table {
                        continue;
                    }
                    for (row_id, row) in store.entries(&rel.table) {
                        if row.get(column).and_then(Value::as_id).is_some_and(|v| v == id) {
                            return Err(CoreError::delete_constraint(
                                &rel.table, row_id, column, id,
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Cascade delete: removes the row, its relationship rows, any row
    /// holding a foreign key to it, and (transitively) referenced rows
    /// that end up unreferenced. Rows still referenced from outside the
    /// cascade are left alone. Returns the deleted entity rows.
    pub(crate) fn delete_cascade(
        &self,
        store: &mut TableStore,
        table: &str,
        id: &Id,
        deleted: &mut Vec<(String, Record)>,
    ) -> CoreResult<()> {
        if deleted.iter().any(|(t, row)| {
            t == table
                && self
                    .registry
                    .id_field(table)
                    .and_then(|f| row.get(f))
                    .and_then(Value::as_id)
                    == Some(id)
        }) {
            // Cycle or diamond: already removed in this cascade.
            return Ok(());
        }
        let Some(row) = store.get(table, id).cloned() else {
            return Ok(());
        };
        debug!(table, %id, "cascade delete");

        // The row and its relationship rows go first, so reference scans
        // below no longer see them (this also terminates reference
        // cycles).
        let mut targets: Vec<(String, Id)> = Vec::new();
        for rel in self.registry.relationships(table) {
            for target in self.related_ids(store, &rel, id) {
                targets.push((rel.target_table.clone(), target));
            }
            let rel_rows: Vec<Id> = store
                .entries(&rel.table)
                .filter(|(_, row)| {
                    row.get(&rel.source_column)
                        .and_then(Value::as_id)
                        .is_some_and(|v| v == id)
                })
                .map(|(row_id, _)| row_id.clone())
                .collect();
            for row_id in rel_rows {
                store.delete(self.registry, &rel.table, &row_id)?;
            }
        }
        for reference in self.registry.references(table) {
            if let Some(Value::Id(target)) = row.get(&reference.field) {
                targets.push((reference.target_table.clone(), target.clone()));
            }
        }

        store.delete(self.registry, table, id)?;
        deleted.push((table.to_string(), row));

        // Inbound edges: rows still holding a foreign key to this one.
        loop {
            let Some((source_table, source_id)) = self.find_referencing(store, table, id) else {
                break;
            };
            self.delete_cascade(store, &source_table, &source_id, deleted)?;
        }

        // Outbound edges: referenced rows that are now orphaned.
        for (target_table, target_id) in targets {
            if self
                .ensure_unreferenced(store, &target_table, &target_id)
                .is_ok()
            {
                self.delete_cascade(store, &target_table, &target_id, deleted)?;
            }
        }
        Ok(())
    }

    /// One row (table, id) holding a foreign key or relationship edge to
    /// `table.#id`, if any. Relationship rows are skipped; the cascade
    /// removes them with their source.
    fn find_referencing(&self, store: &TableStore, table: &str, id: &Id) -> Option<(String, Id)> {
        for source_table in self.registry.tables() {
            for reference in self.registry.references(source_table) {
                if reference.target_table != table {
                    continue;
                }
                for (row_id, row) in store.entries(source_table) {
                    if row
                        .get(&reference.field)
                        .and_then(Value::as_id)
                        .is_some_and(|v| v == id)
                    {
                        return Some((source_table.to_string(), row_id.clone()));
                    }
                }
            }
            // A relationship row pointing at this target pulls its source
            // entity into the cascade.
            for rel in self.registry.relationships(source_table) {
                if rel.target_table != table {
                    continue;
                }
                for (_, row) in store.entries(&rel.table) {
                    if row
                        .get(&rel.target_column)
                        .and_then(Value::as_id)
                        .is_some_and(|v| v == id)
                    {
                        let source = row.get(&rel.source_column).and_then(Value::as_id)?;
                        return Some((rel.source_table.clone(), source.clone()));
                    }
                }
            }
        }
        None
    }
}

/// [`reldb_query::PathResolver`] over the registry and store, used for
/// dotted-path traversal during condition evaluation.
pub(crate) struct StoreResolver<'a> {
    pub registry: &'a SchemaRegistry,
    pub store: &'a TableStore,
}

impl reldb_query::PathResolver for StoreResolver<'_> {
    fn fetch(&self, table: &str, id: &Id) -> Option<Record> {
        self.store.get(table, id).cloned()
    }

    fn target_table(&self, table: &str, field: &str) -> Option<String> {
        if let Some(reference) = self.registry.reference(table, field) {
            return Some(reference.target_table);
        }
        self.registry
            .relationship(table, field)
            .map(|rel| rel.target_table)
    }

    fn related_ids(&self, table: &str, field: &str, id: &Id) -> Vec<Id> {
        let Some(rel) = self.registry.relationship(table, field) else {
            return Vec::new();
        };
        Resolver::new(self.registry).related_ids(self.store, &rel, id)
    }

    fn id_field(&self, table: &str) -> Option<String> {
        self.registry.id_field(table).map(ToString::to_string)
    }
}
