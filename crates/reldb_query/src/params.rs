//! Query parameters.

use crate::ast::Operand;
use reldb_value::Value;
use std::collections::HashMap;

/// Parameter values for a condition.
///
/// Positional values bind `?` placeholders left to right; named values bind
/// `:name` placeholders. A single bundle may carry both, so one argument can
/// serve either style of query.
#[derive(Debug, Clone, Default)]
pub struct Params {
    positional: Vec<Value>,
    named: HashMap<String, Value>,
}

impl Params {
    /// Creates an empty parameter bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional value.
    #[must_use]
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Resolves an operand against this bundle.
    ///
    /// Literals resolve to themselves; placeholders to the bound value, or
    /// `None` when unbound.
    #[must_use]
    pub fn resolve<'a>(&'a self, operand: &'a Operand) -> Option<&'a Value> {
        match operand {
            Operand::Literal(value) => Some(value),
            Operand::Positional(index) => self.positional.get(*index),
            Operand::Named(name) => self.named.get(name),
        }
    }

    /// True if no values are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self::new().push(value)
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: HashMap::new(),
        }
    }
}

impl From<HashMap<String, Value>> for Params {
    fn from(named: HashMap<String, Value>) -> Self {
        Self {
            positional: Vec::new(),
            named,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_positional_and_named() {
        let params = Params::new().push(1i64).with("state", "NY");
        assert_eq!(
            params.resolve(&Operand::Positional(0)),
            Some(&Value::Int(1))
        );
        assert_eq!(
            params.resolve(&Operand::Named("state".into())),
            Some(&Value::Text("NY".into()))
        );
        assert_eq!(params.resolve(&Operand::Positional(1)), None);
        assert_eq!(params.resolve(&Operand::Named("missing".into())), None);
    }

    #[test]
    fn literal_resolves_to_itself() {
        let params = Params::new();
        assert_eq!(
            params.resolve(&Operand::Literal(Value::Bool(true))),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn single_value_becomes_positional() {
        let params = Params::from(Value::Text("joe".into()));
        assert_eq!(
            params.resolve(&Operand::Positional(0)),
            Some(&Value::Text("joe".into()))
        );
    }
}
