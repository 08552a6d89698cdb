//! Lazy entity references.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use reldb_value::{value_to_json, Id, Value};
use serde_json::json;
use std::sync::Arc;

/// A fetch hook: given an identifier, yields the materialized entity
/// (possibly via an external adapter).
pub type FetchFn<T> = Arc<dyn Fn(&Id) -> CoreResult<Option<T>> + Send + Sync>;

#[derive(Debug, Clone)]
enum RefState<T> {
    Null,
    IdOnly(Id),
    EntityOnly(Box<T>),
    Both(Id, Box<T>),
}

/// A lazy pointer to another entity.
///
/// The four states: null, identifier only, loaded entity only (the
/// identifier derives from the entity), or both. Fetching goes through a
/// caller-supplied hook.
#[derive(Clone)]
pub struct EntityRef<T: Entity> {
    state: RefState<T>,
    fetch: Option<FetchFn<T>>,
}

impl<T: Entity> Default for EntityRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Entity> EntityRef<T> {
    /// A null reference.
    #[must_use]
    pub fn null() -> Self {
        Self {
            state: RefState::Null,
            fetch: None,
        }
    }

    /// A reference by identifier.
    #[must_use]
    pub fn from_id(id: impl Into<Id>) -> Self {
        Self {
            state: RefState::IdOnly(id.into()),
            fetch: None,
        }
    }

    /// A reference holding a loaded entity.
    #[must_use]
    pub fn from_entity(entity: T) -> Self {
        let state = match derived_id(&entity) {
            Some(id) => RefState::Both(id, Box::new(entity)),
            None => RefState::EntityOnly(Box::new(entity)),
        };
        Self { state, fetch: None }
    }

    /// Attaches a fetch hook.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchFn<T>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// True when neither identifier nor entity is present.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.state, RefState::Null)
    }

    /// True when the entity is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, RefState::EntityOnly(_) | RefState::Both(..))
    }

    /// The identifier, if known or derivable from the loaded entity.
    #[must_use]
    pub fn id(&self) -> Option<Id> {
        match &self.state {
            RefState::Null => None,
            RefState::IdOnly(id) | RefState::Both(id, _) => Some(id.clone()),
            RefState::EntityOnly(entity) => derived_id(entity.as_ref()),
        }
    }

    /// The loaded entity, without fetching.
    #[must_use]
    pub fn entity(&self) -> Option<&T> {
        match &self.state {
            RefState::EntityOnly(entity) | RefState::Both(_, entity) => Some(entity),
            RefState::Null | RefState::IdOnly(_) => None,
        }
    }

    /// The loaded entity, fetching through the hook when only the
    /// identifier is present.
    pub fn get(&mut self) -> CoreResult<Option<&T>> {
        if let RefState::IdOnly(id) = &self.state {
            let id = id.clone();
            if let Some(entity) = self.run_fetch(&id)? {
                self.state = RefState::Both(id, Box::new(entity));
            }
        }
        Ok(match &self.state {
            RefState::EntityOnly(entity) | RefState::Both(_, entity) => Some(entity),
            RefState::Null | RefState::IdOnly(_) => None,
        })
    }

    /// Stores a loaded entity.
    pub fn set(&mut self, entity: T) {
        self.state = match derived_id(&entity) {
            Some(id) => RefState::Both(id, Box::new(entity)),
            None => RefState::EntityOnly(Box::new(entity)),
        };
    }

    /// Points the reference at an identifier. A loaded entity with a
    /// different identifier is disposed.
    pub fn set_id(&mut self, id: impl Into<Id>) {
        let id = id.into();
        let keep = match &self.state {
            RefState::EntityOnly(entity) | RefState::Both(_, entity) => {
                derived_id(entity.as_ref()).is_some_and(|have| have == id)
            }
            _ => false,
        };
        self.state = if keep {
            match std::mem::replace(&mut self.state, RefState::Null) {
                RefState::EntityOnly(entity) | RefState::Both(_, entity) => {
                    RefState::Both(id, entity)
                }
                other => other,
            }
        } else {
            RefState::IdOnly(id)
        };
    }

    /// Clears the reference.
    pub fn clear(&mut self) {
        self.state = RefState::Null;
    }

    /// Forces a fetch by identifier, replacing any loaded entity.
    pub fn refresh(&mut self) -> CoreResult<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };
        self.state = match self.run_fetch(&id)? {
            Some(entity) => RefState::Both(id, Box::new(entity)),
            None => RefState::IdOnly(id),
        };
        Ok(())
    }

    /// Renders the reference: `{"EntityReference": <type>, "id": …}` by
    /// identifier, or with `"entity"` when loaded.
    pub fn to_json(&self) -> CoreResult<serde_json::Value> {
        let mut json = json!({ "EntityReference": T::type_name() });
        match &self.state {
            RefState::Null => {
                json["id"] = serde_json::Value::Null;
            }
            RefState::IdOnly(id) => {
                json["id"] = value_to_json(&Value::Id(id.clone()));
            }
            RefState::EntityOnly(entity) | RefState::Both(_, entity) => {
                json["entity"] = entity.to_json()?;
            }
        }
        Ok(json)
    }

    fn run_fetch(&self, id: &Id) -> CoreResult<Option<T>> {
        let Some(fetch) = &self.fetch else {
            return Ok(None);
        };
        fetch(id).map_err(|err| CoreError::fetch_failed(err.to_string()))
    }
}

impl<T: Entity> PartialEq for EntityRef<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.is_null() && other.is_null(),
            _ => false,
        }
    }
}

impl<T: Entity> std::fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            RefState::Null => "null",
            RefState::IdOnly(_) => "id",
            RefState::EntityOnly(_) => "entity",
            RefState::Both(..) => "both",
        };
        f.debug_struct("EntityRef")
            .field("type", &T::type_name())
            .field("state", &state)
            .field("id", &self.id())
            .finish()
    }
}

/// The list analog of [`EntityRef`]: parallel identifier and entity
/// slots, positionally aligned.
#[derive(Clone)]
pub struct EntityRefList<T: Entity> {
    ids: Vec<Option<Id>>,
    entities: Vec<Option<T>>,
    fetch: Option<FetchFn<T>>,
}

impl<T: Entity> Default for EntityRefList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityRefList<T> {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            entities: Vec::new(),
            fetch: None,
        }
    }

    /// A list of identifiers.
    #[must_use]
    pub fn from_ids(ids: Vec<Id>) -> Self {
        let entities = ids.iter().map(|_| None).collect();
        Self {
            ids: ids.into_iter().map(Some).collect(),
            entities,
            fetch: None,
        }
    }

    /// Attaches a fetch hook.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchFn<T>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the list holds nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Appends a reference by identifier.
    pub fn add_id(&mut self, id: impl Into<Id>) {
        self.ids.push(Some(id.into()));
        self.entities.push(None);
    }

    /// Appends a loaded entity.
    pub fn add(&mut self, entity: T) {
        self.ids.push(derived_id(&entity));
        self.entities.push(Some(entity));
    }

    /// Removes the reference at `index`.
    pub fn remove_at(&mut self, index: usize) {
        if index < self.ids.len() {
            self.ids.remove(index);
            self.entities.remove(index);
        }
    }

    /// The known identifiers, in position order.
    #[must_use]
    pub fn ids(&self) -> Vec<Id> {
        self.ids.iter().flatten().cloned().collect()
    }

    /// The loaded entity at `index`, without fetching.
    #[must_use]
    pub fn entity_at(&self, index: usize) -> Option<&T> {
        self.entities.get(index)?.as_ref()
    }

    /// The entity at `index`, lazily fetching a hole through the hook.
    pub fn get_at(&mut self, index: usize) -> CoreResult<Option<&T>> {
        if index >= self.ids.len() {
            return Ok(None);
        }
        if self.entities[index].is_none() {
            if let (Some(id), Some(fetch)) = (&self.ids[index], &self.fetch) {
                self.entities[index] =
                    fetch(id).map_err(|err| CoreError::fetch_failed(err.to_string()))?;
            }
        }
        Ok(self.entities[index].as_ref())
    }

    /// Fetches every hole in the entity list.
    pub fn refresh(&mut self) -> CoreResult<()> {
        for index in 0..self.ids.len() {
            self.get_at(index)?;
        }
        Ok(())
    }

    /// Renders the list:
    /// `{"EntityReferenceList": <type>, "ids": […], "entities": […]}`.
    pub fn to_json(&self) -> CoreResult<serde_json::Value> {
        let ids: Vec<serde_json::Value> = self
            .ids
            .iter()
            .map(|id| match id {
                Some(id) => value_to_json(&Value::Id(id.clone())),
                None => serde_json::Value::Null,
            })
            .collect();
        let mut entities = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            entities.push(match entity {
                Some(entity) => entity.to_json()?,
                None => serde_json::Value::Null,
            });
        }
        Ok(json!({
            "EntityReferenceList": T::type_name(),
            "ids": ids,
            "entities": entities,
        }))
    }
}

impl<T: Entity> std::fmt::Debug for EntityRefList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRefList")
            .field("type", &T::type_name())
            .field("len", &self.len())
            .finish()
    }
}

/// Identifier carried by a loaded entity, if it has one.
fn derived_id<T: Entity>(entity: &T) -> Option<Id> {
    match entity.id() {
        Value::Id(id) => Some(id),
        Value::Int(n) => Some(Id::Int(n)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDescriptor, FieldDef, FieldType};
    use std::sync::OnceLock;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Widget {
        id: Option<i64>,
        label: String,
    }

    impl Entity for Widget {
        fn descriptor() -> &'static EntityDescriptor {
            static DESCRIPTOR: OnceLock<EntityDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                EntityDescriptor::new(
                    "Widget",
                    "widget",
                    "id",
                    vec![
                        FieldDef::new("id", FieldType::Int),
                        FieldDef::new("label", FieldType::Text),
                    ],
                )
            })
        }

        fn get_field(&self, name: &str) -> CoreResult<Value> {
            match name {
                "id" => Ok(self.id.map(Id::Int).map_or(Value::Null, Value::Id)),
                "label" => Ok(Value::Text(self.label.clone())),
                _ => Err(CoreError::field_not_found("widget", name)),
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> CoreResult<()> {
            match name {
                "id" => {
                    self.id = match value {
                        Value::Id(Id::Int(n)) | Value::Int(n) => Some(n),
                        _ => None,
                    };
                }
                "label" => {
                    if let Value::Text(s) = value {
                        self.label = s;
                    }
                }
                _ => return Err(CoreError::field_not_found("widget", name)),
            }
            Ok(())
        }
    }

    fn widget(id: i64, label: &str) -> Widget {
        Widget {
            id: Some(id),
            label: label.into(),
        }
    }

    #[test]
    fn four_states() {
        let null = EntityRef::<Widget>::null();
        assert!(null.is_null() && !null.is_loaded());

        let by_id = EntityRef::<Widget>::from_id(Id::Int(1));
        assert!(!by_id.is_null() && !by_id.is_loaded());
        assert_eq!(by_id.id(), Some(Id::Int(1)));

        let loaded = EntityRef::from_entity(widget(2, "w"));
        assert!(loaded.is_loaded());
        assert_eq!(loaded.id(), Some(Id::Int(2)));

        let unstored = EntityRef::from_entity(Widget::default());
        assert!(unstored.is_loaded());
        assert_eq!(unstored.id(), None);
    }

    #[test]
    fn set_id_disposes_mismatched_entity() {
        let mut reference = EntityRef::from_entity(widget(1, "w"));
        reference.set_id(Id::Int(2));
        assert!(!reference.is_loaded());
        assert_eq!(reference.id(), Some(Id::Int(2)));

        let mut same = EntityRef::from_entity(widget(3, "w"));
        same.set_id(Id::Int(3));
        assert!(same.is_loaded());
    }

    #[test]
    fn get_fetches_through_hook() {
        let fetch: FetchFn<Widget> = Arc::new(|id| {
            Ok(match id {
                Id::Int(1) => Some(widget(1, "fetched")),
                _ => None,
            })
        });
        let mut reference = EntityRef::<Widget>::from_id(Id::Int(1)).with_fetch(fetch.clone());
        assert_eq!(reference.get().unwrap().unwrap().label, "fetched");
        assert!(reference.is_loaded());

        let mut missing = EntityRef::<Widget>::from_id(Id::Int(9)).with_fetch(fetch);
        assert!(missing.get().unwrap().is_none());
        assert!(!missing.is_loaded());
    }

    #[test]
    fn fetch_errors_surface_as_fetch_failed() {
        let fetch: FetchFn<Widget> = Arc::new(|_| Err(CoreError::fetch_failed("offline")));
        let mut reference = EntityRef::<Widget>::from_id(Id::Int(1)).with_fetch(fetch);
        assert!(matches!(
            reference.get(),
            Err(CoreError::FetchFailed { .. })
        ));
    }

    #[test]
    fn equality_is_by_id() {
        let a = EntityRef::<Widget>::from_id(Id::Int(5));
        let b = EntityRef::from_entity(widget(5, "w"));
        let c = EntityRef::<Widget>::from_id(Id::Int(6));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(EntityRef::<Widget>::null(), EntityRef::<Widget>::null());
    }

    #[test]
    fn reference_json_forms() {
        let by_id = EntityRef::<Widget>::from_id(Id::Int(4));
        let json = by_id.to_json().unwrap();
        assert_eq!(json["EntityReference"], "Widget");
        assert_eq!(json["id"], 4);

        let loaded = EntityRef::from_entity(widget(4, "w"));
        let json = loaded.to_json().unwrap();
        assert_eq!(json["entity"]["label"], "w");
    }

    #[test]
    fn list_alignment_and_lazy_get() {
        let fetch: FetchFn<Widget> = Arc::new(|id| {
            Ok(match id {
                Id::Int(n) => Some(widget(*n, "w")),
                Id::Hash(_) => None,
            })
        });
        let mut list =
            EntityRefList::<Widget>::from_ids(vec![Id::Int(1), Id::Int(2)]).with_fetch(fetch);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get_at(1).unwrap().unwrap().id, Some(2));
        assert!(list.get_at(5).unwrap().is_none());

        list.add(widget(3, "w"));
        assert_eq!(list.ids(), vec![Id::Int(1), Id::Int(2), Id::Int(3)]);
        list.remove_at(0);
        assert_eq!(list.ids(), vec![Id::Int(2), Id::Int(3)]);
    }

    #[test]
    fn list_json_keeps_holes() {
        let mut list = EntityRefList::<Widget>::from_ids(vec![Id::Int(1)]);
        list.add(widget(2, "w"));
        let json = list.to_json().unwrap();
        assert_eq!(json["EntityReferenceList"], "Widget");
        assert_eq!(json["ids"][0], 1);
        assert!(json["entities"][0].is_null());
        assert_eq!(json["entities"][1]["label"], "w");
    }
}
