//! Sample entity model.

use reldb_core::{
    Config, CoreError, CoreResult, Database, Entity, EntityDescriptor, EntityRef, EntityRefList,
    FieldDef, FieldType, Id, Value,
};
use std::sync::OnceLock;

/// A postal address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    /// Identifier; `None` while unstored.
    pub id: Option<i64>,
    /// State code.
    pub state: String,
    /// City name.
    pub city: String,
    /// Street name.
    pub street: String,
    /// House number.
    pub number: i64,
}

impl Address {
    /// Creates an unstored address.
    pub fn new(state: &str, city: &str, street: &str, number: i64) -> Self {
        Self {
            id: None,
            state: state.into(),
            city: city.into(),
            street: street.into(),
            number,
        }
    }
}

impl Entity for Address {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::new(
                "Address",
                "address",
                "id",
                vec![
                    FieldDef::new("id", FieldType::Int),
                    FieldDef::new("state", FieldType::Text).required().max_length(2),
                    FieldDef::new("city", FieldType::Text),
                    FieldDef::new("street", FieldType::Text),
                    FieldDef::new("number", FieldType::Int),
                ],
            )
        })
    }

    fn get_field(&self, name: &str) -> CoreResult<Value> {
        Ok(match name {
            "id" => id_value(self.id),
            "state" => Value::Text(self.state.clone()),
            "city" => Value::Text(self.city.clone()),
            "street" => Value::Text(self.street.clone()),
            "number" => Value::Int(self.number),
            _ => return Err(CoreError::field_not_found("address", name)),
        })
    }

    fn set_field(&mut self, name: &str, value: Value) -> CoreResult<()> {
        match name {
            "id" => self.id = int_id(&value),
            "state" => self.state = text(value),
            "city" => self.city = text(value),
            "street" => self.street = text(value),
            "number" => self.number = value.as_int().unwrap_or_default(),
            _ => return Err(CoreError::field_not_found("address", name)),
        }
        Ok(())
    }
}

/// An access role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Role {
    /// Identifier; `None` while unstored.
    pub id: Option<i64>,
    /// Role name, one of `admin`, `user`, `guest`.
    pub name: String,
}

impl Role {
    /// Creates an unstored role.
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for Role {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::new(
                "Role",
                "role",
                "id",
                vec![
                    FieldDef::new("id", FieldType::Int),
                    FieldDef::new("name", FieldType::enumeration(&["admin", "user", "guest"]))
                        .required(),
                ],
            )
        })
    }

    fn get_field(&self, name: &str) -> CoreResult<Value> {
        Ok(match name {
            "id" => id_value(self.id),
            "name" => Value::Text(self.name.clone()),
            _ => return Err(CoreError::field_not_found("role", name)),
        })
    }

    fn set_field(&mut self, name: &str, value: Value) -> CoreResult<()> {
        match name {
            "id" => self.id = int_id(&value),
            "name" => self.name = text(value),
            _ => return Err(CoreError::field_not_found("role", name)),
        }
        Ok(())
    }
}

/// A user with an address and a set of roles.
#[derive(Debug, Clone, Default)]
pub struct User {
    /// Identifier; `None` while unstored.
    pub id: Option<i64>,
    /// Email, unique across users.
    pub email: String,
    /// Password.
    pub password: String,
    /// The user's address.
    pub address: EntityRef<Address>,
    /// The user's roles.
    pub roles: EntityRefList<Role>,
}

impl User {
    /// Creates an unstored user.
    pub fn new(email: &str, password: &str, address: Address, roles: Vec<Role>) -> Self {
        let mut role_list = EntityRefList::new();
        for role in roles {
            role_list.add(role);
        }
        Self {
            id: None,
            email: email.into(),
            password: password.into(),
            address: EntityRef::from_entity(address),
            roles: role_list,
        }
    }
}

impl Entity for User {
    fn descriptor() -> &'static EntityDescriptor {
        static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            EntityDescriptor::new(
                "User",
                "user",
                "id",
                vec![
                    FieldDef::new("id", FieldType::Int),
                    FieldDef::new("email", FieldType::Text).unique().required(),
                    FieldDef::new("password", FieldType::Text),
                    FieldDef::new("address", FieldType::Ref("Address".into())),
                    FieldDef::new("roles", FieldType::RefList("Role".into())),
                ],
            )
        })
    }

    fn get_field(&self, name: &str) -> CoreResult<Value> {
        Ok(match name {
            "id" => id_value(self.id),
            "email" => Value::Text(self.email.clone()),
            "password" => Value::Text(self.password.clone()),
            "address" => reference_value(&self.address)?,
            "roles" => reference_list_value(&self.roles)?,
            _ => return Err(CoreError::field_not_found("user", name)),
        })
    }

    fn set_field(&mut self, name: &str, value: Value) -> CoreResult<()> {
        match name {
            "id" => self.id = int_id(&value),
            "email" => self.email = text(value),
            "password" => self.password = text(value),
            "address" => self.address = reference_from_value(value)?,
            "roles" => self.roles = reference_list_from_value(value)?,
            _ => return Err(CoreError::field_not_found("user", name)),
        }
        Ok(())
    }
}

/// A database with the sample schema registered.
pub fn sample_database(config: Config) -> Database {
    let db = Database::open(config);
    db.register::<Address>();
    db.register::<Role>();
    db.register::<User>();
    db
}

fn id_value(id: Option<i64>) -> Value {
    id.map(Id::Int).map_or(Value::Null, Value::Id)
}

fn int_id(value: &Value) -> Option<i64> {
    match value {
        Value::Id(Id::Int(n)) | Value::Int(n) => Some(*n),
        _ => None,
    }
}

fn text(value: Value) -> String {
    match value {
        Value::Text(s) => s,
        _ => String::new(),
    }
}

/// A reference field's row value: the loaded entity travels as a nested
/// record (the store resolves it depth-first, reusing its identifier when
/// it is already stored), a bare identifier as itself.
fn reference_value<T: Entity>(reference: &EntityRef<T>) -> CoreResult<Value> {
    match reference.entity() {
        Some(entity) => Ok(Value::Record(entity.to_record()?)),
        None => match reference.id() {
            Some(id) => Ok(Value::Id(id)),
            None => Ok(Value::Null),
        },
    }
}

fn reference_from_value<T: Entity>(value: Value) -> CoreResult<EntityRef<T>> {
    Ok(match value {
        Value::Null => EntityRef::null(),
        Value::Id(id) => EntityRef::from_id(id),
        Value::Int(n) => EntityRef::from_id(Id::Int(n)),
        Value::Record(record) => EntityRef::from_entity(T::from_record(&record)?),
        other => {
            return Err(CoreError::fetch_failed(format!(
                "cannot build reference from {}",
                other.type_name()
            )))
        }
    })
}

fn reference_list_value<T: Entity>(list: &EntityRefList<T>) -> CoreResult<Value> {
    let ids = list.ids();
    if ids.len() == list.len() {
        return Ok(Value::IdList(ids));
    }
    // Unstored entries: hand the rows over for depth-first resolution.
    let mut records = Vec::with_capacity(list.len());
    for index in 0..list.len() {
        if let Some(entity) = list.entity_at(index) {
            records.push(entity.to_record()?);
        }
    }
    Ok(Value::Records(records))
}

fn reference_list_from_value<T: Entity>(value: Value) -> CoreResult<EntityRefList<T>> {
    Ok(match value {
        Value::Null => EntityRefList::new(),
        Value::IdList(ids) => EntityRefList::from_ids(ids),
        Value::Records(records) => {
            let mut list = EntityRefList::new();
            for record in &records {
                list.add(T::from_record(record)?);
            }
            list
        }
        // Eagerly materialized lists mix records and dangling ids.
        Value::List(items) => {
            let mut list = EntityRefList::new();
            for item in items {
                match item {
                    Value::Id(id) => list.add_id(id),
                    Value::Record(record) => list.add(T::from_record(&record)?),
                    _ => {}
                }
            }
            list
        }
        other => {
            return Err(CoreError::fetch_failed(format!(
                "cannot build reference list from {}",
                other.type_name()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_round_trips_through_record() {
        let user = User::new(
            "joe@x.com",
            "123",
            Address::new("NY", "New York", "street A", 101),
            vec![Role::new("admin")],
        );
        let record = user.to_record().unwrap();
        assert_eq!(record.get("email"), Some(&Value::Text("joe@x.com".into())));
        // Unstored nested entities travel as records.
        assert!(record.get("address").unwrap().as_record().is_some());
        assert!(record.get("roles").unwrap().as_records().is_some());
    }

    #[test]
    fn stored_user_fields_are_ids() {
        let mut user = User::new(
            "joe@x.com",
            "123",
            Address::new("NY", "New York", "street A", 101),
            vec![],
        );
        user.address.set_id(Id::Int(5));
        let record = user.to_record().unwrap();
        assert_eq!(record.get("address"), Some(&Value::Id(Id::Int(5))));
    }
}
