//! The entity capability trait.

use crate::error::CoreResult;
use crate::schema::EntityDescriptor;
use reldb_value::{record_to_json, Record, Value};

/// Capability set the store is generic over.
///
/// An entity type carries its [`EntityDescriptor`] (the explicit schema
/// description registered at program start) and exposes field access by
/// name. Everything else — record and JSON bridges — derives from those
/// two capabilities.
pub trait Entity: Default {
    /// The schema description of this type.
    fn descriptor() -> &'static EntityDescriptor;

    /// Returns the value of a field.
    fn get_field(&self, name: &str) -> CoreResult<Value>;

    /// Sets the value of a field.
    fn set_field(&mut self, name: &str, value: Value) -> CoreResult<()>;

    /// The entity type name.
    #[must_use]
    fn type_name() -> &'static str {
        &Self::descriptor().entity
    }

    /// The identifier field name.
    #[must_use]
    fn id_field() -> &'static str {
        &Self::descriptor().id_field
    }

    /// The identifier value; `Null` while unstored.
    fn id(&self) -> Value {
        self.get_field(Self::id_field()).unwrap_or(Value::Null)
    }

    /// Sets the identifier.
    fn set_id(&mut self, id: Value) -> CoreResult<()> {
        self.set_field(Self::id_field(), id)
    }

    /// Renders the entity as a row in declared field order.
    fn to_record(&self) -> CoreResult<Record> {
        let mut record = Record::new();
        for field in &Self::descriptor().fields {
            record.set(field.name.clone(), self.get_field(&field.name)?);
        }
        Ok(record)
    }

    /// Builds an entity from a row. Fields absent from the row keep their
    /// default values.
    fn from_record(record: &Record) -> CoreResult<Self> {
        let mut entity = Self::default();
        for field in &Self::descriptor().fields {
            if let Some(value) = record.get(&field.name) {
                entity.set_field(&field.name, value.clone())?;
            }
        }
        Ok(entity)
    }

    /// The entity's JSON form: a mapping of its declared fields.
    fn to_json(&self) -> CoreResult<serde_json::Value> {
        Ok(record_to_json(&self.to_record()?))
    }
}
