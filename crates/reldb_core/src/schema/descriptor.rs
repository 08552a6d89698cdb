//! Entity type descriptors.
//!
//! A descriptor is the explicit schema-description struct registered per
//! entity type at program start. The store consumes descriptors only; how
//! they are produced (hand-written, generated) is up to the caller.

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Exact decimal.
    Decimal,
    /// Floating point.
    Float,
    /// Text string.
    Text,
    /// Timestamp, milliseconds since the epoch.
    Timestamp,
    /// Time of day.
    Time,
    /// Binary blob.
    Bytes,
    /// Enumeration over the named variants.
    Enum(Vec<String>),
    /// Reference to another entity type, stored inline as the target's
    /// identifier (a foreign key).
    Ref(String),
    /// List of references to another entity type, carried through an
    /// auto-managed relationship table.
    RefList(String),
}

impl FieldType {
    /// An enumeration type over the given variants.
    #[must_use]
    pub fn enumeration(variants: &[&str]) -> Self {
        Self::Enum(variants.iter().map(ToString::to_string).collect())
    }

    /// The referenced entity type, if this is a reference field.
    #[must_use]
    pub fn ref_target(&self) -> Option<&str> {
        match self {
            Self::Ref(target) | Self::RefList(target) => Some(target),
            _ => None,
        }
    }

    /// True for `RefList` fields.
    #[must_use]
    pub fn is_ref_list(&self) -> bool {
        matches!(self, Self::RefList(_))
    }
}

/// A field declaration with its constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub ty: FieldType,
    /// No two rows may share a value.
    pub unique: bool,
    /// The field must be present and non-null on store.
    pub required: bool,
    /// Maximum text length.
    pub max_length: Option<usize>,
    /// Regular expression the text value must match.
    pub pattern: Option<String>,
}

impl FieldDef {
    /// Creates a field declaration with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            unique: false,
            required: false,
            max_length: None,
            pattern: None,
        }
    }

    /// Marks the field unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the maximum text length.
    #[must_use]
    pub fn max_length(mut self, limit: usize) -> Self {
        self.max_length = Some(limit);
        self
    }

    /// Sets the pattern constraint.
    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// Schema description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity type name, e.g. `User`.
    pub entity: String,
    /// Backing table name, e.g. `user`.
    pub table: String,
    /// Name of the identifier field.
    pub id_field: String,
    /// Ordered field declarations. The identifier field is part of the
    /// list.
    pub fields: Vec<FieldDef>,
}

impl EntityDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        table: impl Into<String>,
        id_field: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            id_field: id_field.into(),
            fields,
        }
    }

    /// Looks up a field by exact name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolves an externally-supplied key against the field list: exact
    /// match first, then lowercase, then the simplified form (lowercase
    /// letters and digits only).
    #[must_use]
    pub fn resolve_field(&self, key: &str) -> Option<&FieldDef> {
        if let Some(field) = self.field(key) {
            return Some(field);
        }
        let lower = key.to_lowercase();
        if let Some(field) = self.fields.iter().find(|f| f.name.to_lowercase() == lower) {
            return Some(field);
        }
        let simple = simplified(key);
        self.fields.iter().find(|f| simplified(&f.name) == simple)
    }
}

/// Lowercase, letters and digits only.
fn simplified(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(
            "User",
            "user",
            "id",
            vec![
                FieldDef::new("id", FieldType::Int),
                FieldDef::new("emailAddress", FieldType::Text).unique().required(),
                FieldDef::new("address", FieldType::Ref("Address".into())),
                FieldDef::new("roles", FieldType::RefList("Role".into())),
            ],
        )
    }

    #[test]
    fn field_lookup() {
        let d = descriptor();
        assert!(d.field("emailAddress").is_some());
        assert!(d.field("emailaddress").is_none());
    }

    #[test]
    fn resolve_field_tries_lowercase_then_simplified() {
        let d = descriptor();
        assert_eq!(d.resolve_field("emailAddress").unwrap().name, "emailAddress");
        assert_eq!(d.resolve_field("EMAILADDRESS").unwrap().name, "emailAddress");
        assert_eq!(d.resolve_field("email_address").unwrap().name, "emailAddress");
        assert!(d.resolve_field("email").is_none());
    }

    #[test]
    fn ref_targets() {
        let d = descriptor();
        assert_eq!(d.field("address").unwrap().ty.ref_target(), Some("Address"));
        assert!(d.field("roles").unwrap().ty.is_ref_list());
        assert_eq!(d.field("id").unwrap().ty.ref_target(), None);
    }
}
