//! Table registry with reference and relationship derivation.

use crate::error::{ConstraintKind, CoreError, CoreResult};
use crate::schema::{EntityDescriptor, FieldDef, FieldType};
use reldb_value::{parse_time, Id, Record, Value};
use std::collections::HashMap;

/// A foreign key derived from a `Ref` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The field on the source table holding the identifier.
    pub field: String,
    /// The referenced table.
    pub target_table: String,
    /// The referenced table's identifier field.
    pub target_field: String,
}

/// A many-to-many edge derived from a `RefList` field.
///
/// The relationship table holds exactly two identifier columns plus a
/// synthetic integer primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// The relationship table, `<source_table>__<field>__rel`.
    pub table: String,
    /// The `RefList` field on the source entity.
    pub field: String,
    /// The source table.
    pub source_table: String,
    /// Column holding the source identifier,
    /// `<source_table>__<source_id_field>`.
    pub source_column: String,
    /// The target table.
    pub target_table: String,
    /// Column holding the target identifier,
    /// `<target_table>__<target_id_field>`.
    pub target_column: String,
}

/// Maps table names to entity descriptors and derives the reference and
/// relationship structure. Immutable once registration is done.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_table: HashMap<String, EntityDescriptor>,
    table_by_entity: HashMap<String, String>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity descriptor.
    pub fn register(&mut self, descriptor: EntityDescriptor) {
        self.table_by_entity
            .insert(descriptor.entity.clone(), descriptor.table.clone());
        self.by_table.insert(descriptor.table.clone(), descriptor);
    }

    /// The descriptor backing a table.
    #[must_use]
    pub fn descriptor(&self, table: &str) -> Option<&EntityDescriptor> {
        self.by_table.get(table)
    }

    /// The descriptor of an entity type.
    #[must_use]
    pub fn descriptor_for_entity(&self, entity: &str) -> Option<&EntityDescriptor> {
        self.table_by_entity
            .get(entity)
            .and_then(|table| self.by_table.get(table))
    }

    /// The table backing an entity type.
    #[must_use]
    pub fn table_of(&self, entity: &str) -> Option<&str> {
        self.table_by_entity.get(entity).map(String::as_str)
    }

    /// The identifier field of a table.
    #[must_use]
    pub fn id_field(&self, table: &str) -> Option<&str> {
        self.by_table.get(table).map(|d| d.id_field.as_str())
    }

    /// All registered table names.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.by_table.keys().map(String::as_str)
    }

    /// The foreign key derived from a `Ref` field, if `field` is one.
    #[must_use]
    pub fn reference(&self, table: &str, field: &str) -> Option<Reference> {
        let descriptor = self.by_table.get(table)?;
        let def = descriptor.field(field)?;
        let FieldType::Ref(target_entity) = &def.ty else {
            return None;
        };
        let target = self.descriptor_for_entity(target_entity)?;
        Some(Reference {
            field: def.name.clone(),
            target_table: target.table.clone(),
            target_field: target.id_field.clone(),
        })
    }

    /// All foreign keys of a table.
    #[must_use]
    pub fn references(&self, table: &str) -> Vec<Reference> {
        let Some(descriptor) = self.by_table.get(table) else {
            return Vec::new();
        };
        descriptor
            .fields
            .iter()
            .filter_map(|f| self.reference(table, &f.name))
            .collect()
    }

    /// The relationship derived from a `RefList` field, if `field` is one.
    #[must_use]
    pub fn relationship(&self, table: &str, field: &str) -> Option<Relationship> {
        let descriptor = self.by_table.get(table)?;
        let def = descriptor.field(field)?;
        let FieldType::RefList(target_entity) = &def.ty else {
            return None;
        };
        let target = self.descriptor_for_entity(target_entity)?;
        Some(Relationship {
            table: format!("{}__{}__rel", descriptor.table, def.name),
            field: def.name.clone(),
            source_table: descriptor.table.clone(),
            source_column: format!("{}__{}", descriptor.table, descriptor.id_field),
            target_table: target.table.clone(),
            target_column: format!("{}__{}", target.table, target.id_field),
        })
    }

    /// All relationships of a table.
    #[must_use]
    pub fn relationships(&self, table: &str) -> Vec<Relationship> {
        let Some(descriptor) = self.by_table.get(table) else {
            return Vec::new();
        };
        descriptor
            .fields
            .iter()
            .filter_map(|f| self.relationship(table, &f.name))
            .collect()
    }

    /// Looks up a relationship by its table name.
    #[must_use]
    pub fn relationship_by_table(&self, rel_table: &str) -> Option<Relationship> {
        self.by_table.keys().find_map(|table| {
            self.relationships(table)
                .into_iter()
                .find(|rel| rel.table == rel_table)
        })
    }

    /// True if `name` names a registered table or a derived relationship
    /// table. Writes to anything else fail with `UnknownTable`.
    #[must_use]
    pub fn is_table_known(&self, name: &str) -> bool {
        self.by_table.contains_key(name) || self.relationship_by_table(name).is_some()
    }

    /// Builds a row from an externally-supplied record, resolving keys
    /// case-insensitively and coercing values to the declared field types.
    pub fn build_row(&self, table: &str, external: &Record) -> CoreResult<Record> {
        let descriptor = self
            .descriptor(table)
            .ok_or_else(|| CoreError::unknown_table(table))?;
        let mut row = Record::new();
        for (key, value) in external.iter() {
            let field = descriptor
                .resolve_field(key)
                .ok_or_else(|| CoreError::field_not_found(table, key))?;
            let coerced = coerce(table, field, value.clone())?;
            row.set(field.name.clone(), coerced);
        }
        Ok(row)
    }
}

/// Coerces an untyped value (typically from JSON) to a field's declared
/// type.
pub(crate) fn coerce(table: &str, field: &FieldDef, value: Value) -> CoreResult<Value> {
    let mismatch = |value: &Value| {
        Err(CoreError::field_invalid(
            ConstraintKind::Type,
            table,
            &field.name,
            value,
        ))
    };
    if value.is_null() {
        return Ok(Value::Null);
    }
    // Identifier values appear in identifier-typed and reference columns.
    if matches!(value, Value::Id(_))
        && matches!(
            field.ty,
            FieldType::Int | FieldType::Text | FieldType::Ref(_)
        )
    {
        return Ok(value);
    }
    Ok(match (&field.ty, value) {
        (FieldType::Bool, v @ Value::Bool(_))
        | (FieldType::Int, v @ Value::Int(_))
        | (FieldType::Float, v @ Value::Float(_))
        | (FieldType::Decimal, v @ Value::Decimal(_))
        | (FieldType::Text, v @ Value::Text(_))
        | (FieldType::Timestamp, v @ Value::Timestamp(_))
        | (FieldType::Time, v @ Value::Time(_))
        | (FieldType::Bytes, v @ Value::Bytes(_)) => v,
        (FieldType::Float, Value::Int(n)) => Value::Float(n as f64),
        (FieldType::Decimal, Value::Int(n)) => Value::Decimal(n.into()),
        (FieldType::Decimal, Value::Text(s)) => match s.parse() {
            Ok(d) => Value::Decimal(d),
            Err(_) => return mismatch(&Value::Text(s)),
        },
        (FieldType::Timestamp, Value::Int(ms)) => Value::Timestamp(ms),
        (FieldType::Time, Value::Text(s)) => match parse_time(&s) {
            Ok(t) => Value::Time(t),
            Err(_) => return mismatch(&Value::Text(s)),
        },
        (FieldType::Bytes, Value::Text(s)) => match parse_hex(&s) {
            Some(bytes) => Value::Bytes(bytes),
            None => return mismatch(&Value::Text(s)),
        },
        (FieldType::Enum(variants), Value::Text(s)) => {
            if variants.contains(&s) {
                Value::Text(s)
            } else {
                return Err(CoreError::field_invalid(
                    ConstraintKind::Range,
                    table,
                    &field.name,
                    &Value::Text(s),
                ));
            }
        }
        (FieldType::Ref(_), v @ (Value::Id(_) | Value::Record(_))) => v,
        (FieldType::Ref(_), Value::Int(n)) => Value::Id(Id::Int(n)),
        (FieldType::RefList(_), v @ (Value::IdList(_) | Value::Records(_))) => v,
        (FieldType::RefList(_), Value::List(items)) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Int(n) => ids.push(Id::Int(n)),
                    Value::Id(id) => ids.push(id),
                    other => return mismatch(&other),
                }
            }
            Value::IdList(ids)
        }
        (_, other) => return mismatch(&other),
    })
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}
