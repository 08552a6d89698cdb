//! Condition evaluation against rows.

use crate::ast::{CmpOp, Cond};
use crate::params::Params;
use crate::{QueryError, QueryResult};
use reldb_value::{Id, Record, Value};
use std::cmp::Ordering;

/// Store-side seam for dotted-path traversal.
///
/// The evaluator itself knows nothing about tables; when a path crosses a
/// foreign key or a relationship field, it asks the resolver for the target
/// table, the related identifiers, and the target rows.
pub trait PathResolver {
    /// Fetches a row by identifier.
    fn fetch(&self, table: &str, id: &Id) -> Option<Record>;

    /// The target table of a reference or relationship field, if `field`
    /// is one.
    fn target_table(&self, table: &str, field: &str) -> Option<String>;

    /// Target identifiers of a relationship (list-of-reference) field for
    /// the given source row.
    fn related_ids(&self, table: &str, field: &str, id: &Id) -> Vec<Id>;

    /// The primary-key field of a table.
    fn id_field(&self, table: &str) -> Option<String>;
}

/// A resolver for flat rows: no references, no relationships.
///
/// Useful for evaluating conditions against standalone records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelations;

impl PathResolver for NoRelations {
    fn fetch(&self, _table: &str, _id: &Id) -> Option<Record> {
        None
    }

    fn target_table(&self, _table: &str, _field: &str) -> Option<String> {
        None
    }

    fn related_ids(&self, _table: &str, _field: &str, _id: &Id) -> Vec<Id> {
        Vec::new()
    }

    fn id_field(&self, _table: &str) -> Option<String> {
        None
    }
}

/// Evaluates conditions against rows, traversing relationships through a
/// [`PathResolver`].
pub struct Evaluator<'a, R: PathResolver> {
    resolver: &'a R,
}

impl<'a, R: PathResolver> Evaluator<'a, R> {
    /// Creates an evaluator over the given resolver.
    pub fn new(resolver: &'a R) -> Self {
        Self { resolver }
    }

    /// Returns whether `record` (a row of `table`) satisfies `cond`.
    pub fn matches(
        &self,
        cond: &Cond,
        table: &str,
        record: &Record,
        params: &Params,
    ) -> QueryResult<bool> {
        match cond {
            Cond::And(parts) => {
                for part in parts {
                    if !self.matches(part, table, record, params)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Cond::Or(parts) => {
                for part in parts {
                    if self.matches(part, table, record, params)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Cond::Cmp { path, op, operand } => {
                let value = params.resolve(operand).ok_or_else(|| {
                    QueryError::type_mismatch(format!("unbound parameter {operand}"))
                })?;
                let leaves = self.leaf_values(table, record, path.segments(), &path.to_string())?;
                apply(*op, &leaves, value)
            }
        }
    }

    /// Collects the candidate values a path yields on a row.
    ///
    /// List-valued steps expand existentially, so the result is the set of
    /// leaves the comparison is tried against.
    fn leaf_values(
        &self,
        table: &str,
        record: &Record,
        segments: &[String],
        full_path: &str,
    ) -> QueryResult<Vec<Value>> {
        let segment = &segments[0];
        let field_name = if segment == "#ID" {
            self.resolver
                .id_field(table)
                .unwrap_or_else(|| "id".to_string())
        } else {
            segment.clone()
        };

        let Some(value) = record.get(&field_name) else {
            // Relationship fields are not stored inline; their targets live
            // in the relationship table.
            if let Some(target) = self.resolver.target_table(table, &field_name) {
                return self.relationship_leaves(table, record, &field_name, &target, segments, full_path);
            }
            return Err(QueryError::unknown_field(full_path));
        };

        if segments.len() == 1 {
            return Ok(expand_leaf(value));
        }

        let rest = &segments[1..];
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Id(id) => {
                let target = self.target_of(table, &field_name, full_path)?;
                match self.resolver.fetch(&target, id) {
                    Some(row) => self.leaf_values(&target, &row, rest, full_path),
                    None => Ok(Vec::new()),
                }
            }
            Value::IdList(ids) => {
                let target = self.target_of(table, &field_name, full_path)?;
                let mut leaves = Vec::new();
                for id in ids {
                    if let Some(row) = self.resolver.fetch(&target, id) {
                        leaves.extend(self.leaf_values(&target, &row, rest, full_path)?);
                    }
                }
                Ok(leaves)
            }
            Value::Record(row) => {
                let target = self
                    .resolver
                    .target_table(table, &field_name)
                    .unwrap_or_else(|| table.to_string());
                self.leaf_values(&target, row, rest, full_path)
            }
            Value::Records(rows) => {
                let target = self
                    .resolver
                    .target_table(table, &field_name)
                    .unwrap_or_else(|| table.to_string());
                let mut leaves = Vec::new();
                for row in rows {
                    leaves.extend(self.leaf_values(&target, row, rest, full_path)?);
                }
                Ok(leaves)
            }
            other => Err(QueryError::type_mismatch(format!(
                "cannot traverse {} through field {field_name} of {full_path}",
                other.type_name()
            ))),
        }
    }

    fn relationship_leaves(
        &self,
        table: &str,
        record: &Record,
        field: &str,
        target: &str,
        segments: &[String],
        full_path: &str,
    ) -> QueryResult<Vec<Value>> {
        let id_field = self
            .resolver
            .id_field(table)
            .unwrap_or_else(|| "id".to_string());
        let Some(Value::Id(row_id)) = record.get(&id_field) else {
            return Ok(Vec::new());
        };
        let ids = self.resolver.related_ids(table, field, row_id);
        if segments.len() == 1 {
            return Ok(ids.into_iter().map(Value::Id).collect());
        }
        let mut leaves = Vec::new();
        for id in ids {
            if let Some(row) = self.resolver.fetch(target, &id) {
                leaves.extend(self.leaf_values(target, &row, &segments[1..], full_path)?);
            }
        }
        Ok(leaves)
    }

    fn target_of(&self, table: &str, field: &str, full_path: &str) -> QueryResult<String> {
        self.resolver
            .target_table(table, field)
            .ok_or_else(|| QueryError::unknown_field(full_path))
    }
}

/// Expands a leaf value into the elements the comparison is tried against.
fn expand_leaf(value: &Value) -> Vec<Value> {
    match value {
        Value::IdList(ids) => ids.iter().cloned().map(Value::Id).collect(),
        Value::List(items) => items.clone(),
        Value::Records(rows) => rows.iter().cloned().map(Value::Record).collect(),
        other => vec![other.clone()],
    }
}

/// Elements of the right-hand side for `=~` / `IN`.
fn rhs_elements(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        Value::IdList(ids) => ids.iter().cloned().map(Value::Id).collect(),
        other => vec![other.clone()],
    }
}

fn apply(op: CmpOp, leaves: &[Value], value: &Value) -> QueryResult<bool> {
    match op {
        CmpOp::Eq => Ok(leaves.iter().any(|leaf| leaf.loose_eq(value))),
        CmpOp::Ne => Ok(leaves.iter().any(|leaf| !leaf.loose_eq(value))),
        CmpOp::Contains | CmpOp::In => {
            let rhs = rhs_elements(value);
            Ok(leaves
                .iter()
                .any(|leaf| rhs.iter().any(|r| leaf.loose_eq(r))))
        }
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            for leaf in leaves {
                if leaf.is_null() {
                    continue;
                }
                let ordering = leaf.loose_cmp(value).ok_or_else(|| {
                    QueryError::type_mismatch(format!(
                        "cannot order {} against {}",
                        leaf.type_name(),
                        value.type_name()
                    ))
                })?;
                let holds = match op {
                    CmpOp::Lt => ordering == Ordering::Less,
                    CmpOp::Le => ordering != Ordering::Greater,
                    CmpOp::Gt => ordering == Ordering::Greater,
                    CmpOp::Ge => ordering != Ordering::Less,
                    _ => unreachable!(),
                };
                if holds {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use std::collections::HashMap;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn eval_flat(text: &str, row: &Record, params: Params) -> QueryResult<bool> {
        let cond = parse(text).unwrap();
        Evaluator::new(&NoRelations).matches(&cond, "t", row, &params)
    }

    #[test]
    fn scalar_comparisons() {
        let row = record(&[
            ("email", Value::Text("joe@x.com".into())),
            ("age", Value::Int(31)),
        ]);
        assert!(eval_flat("email == 'joe@x.com'", &row, Params::new()).unwrap());
        assert!(eval_flat("age > 30", &row, Params::new()).unwrap());
        assert!(!eval_flat("age < 30", &row, Params::new()).unwrap());
        assert!(eval_flat("age >= 31 && email != 'x'", &row, Params::new()).unwrap());
    }

    #[test]
    fn placeholder_binding() {
        let row = record(&[("email", Value::Text("joe@x.com".into()))]);
        let params = Params::new().push("joe@x.com");
        assert!(eval_flat("email == ?", &row, params).unwrap());

        let named = Params::new().with("mail", "joe@x.com");
        assert!(eval_flat("email == :mail", &row, named).unwrap());
    }

    #[test]
    fn unbound_parameter_errors() {
        let row = record(&[("email", Value::Text("x".into()))]);
        assert!(matches!(
            eval_flat("email == ?", &row, Params::new()),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_field_errors() {
        let row = record(&[("a", Value::Int(1))]);
        assert!(matches!(
            eval_flat("missing == 1", &row, Params::new()),
            Err(QueryError::UnknownField { .. })
        ));
    }

    #[test]
    fn contains_over_list_field() {
        let row = record(&[("roles", Value::IdList(vec![Id::Int(1), Id::Int(2)]))]);
        assert!(eval_flat("roles =~ 2", &row, Params::new()).unwrap());
        assert!(!eval_flat("roles =~ 3", &row, Params::new()).unwrap());
    }

    #[test]
    fn in_list_matrix() {
        let row = record(&[("state", Value::Text("CA".into()))]);
        // scalar path, list parameter: any-of
        let params = Params::from(Value::List(vec![
            Value::Text("NY".into()),
            Value::Text("CA".into()),
        ]));
        assert!(eval_flat("state IN ?", &row, params).unwrap());
        // scalar path, scalar parameter: collapses to equality
        assert!(eval_flat("state =~ ?", &row, Params::from(Value::Text("CA".into()))).unwrap());
        assert!(!eval_flat("state =~ ?", &row, Params::from(Value::Text("NY".into()))).unwrap());
        // list path, list parameter: any-in-any
        let tags = record(&[(
            "tags",
            Value::List(vec![Value::Text("a".into()), Value::Text("b".into())]),
        )]);
        let params = Params::from(Value::List(vec![
            Value::Text("b".into()),
            Value::Text("z".into()),
        ]));
        assert!(eval_flat("tags =~ ?", &tags, params).unwrap());
    }

    #[test]
    fn null_field_never_orders() {
        let row = record(&[("age", Value::Null)]);
        assert!(!eval_flat("age > 1", &row, Params::new()).unwrap());
        assert!(eval_flat("age != 1", &row, Params::new()).unwrap());
    }

    /// Two-table resolver: users with an `address` FK into addresses and a
    /// `roles` relationship.
    struct TwoTables {
        addresses: HashMap<Id, Record>,
        roles: HashMap<Id, Record>,
        user_roles: Vec<(Id, Id)>,
    }

    impl PathResolver for TwoTables {
        fn fetch(&self, table: &str, id: &Id) -> Option<Record> {
            match table {
                "address" => self.addresses.get(id).cloned(),
                "role" => self.roles.get(id).cloned(),
                _ => None,
            }
        }

        fn target_table(&self, table: &str, field: &str) -> Option<String> {
            match (table, field) {
                ("user", "address") => Some("address".into()),
                ("user", "roles") => Some("role".into()),
                _ => None,
            }
        }

        fn related_ids(&self, table: &str, field: &str, id: &Id) -> Vec<Id> {
            if table == "user" && field == "roles" {
                self.user_roles
                    .iter()
                    .filter(|(source, _)| source == id)
                    .map(|(_, target)| target.clone())
                    .collect()
            } else {
                Vec::new()
            }
        }

        fn id_field(&self, _table: &str) -> Option<String> {
            Some("id".to_string())
        }
    }

    fn two_tables() -> TwoTables {
        let mut addresses = HashMap::new();
        addresses.insert(
            Id::Int(1),
            record(&[
                ("id", Value::Id(Id::Int(1))),
                ("state", Value::Text("NY".into())),
            ]),
        );
        let mut roles = HashMap::new();
        roles.insert(
            Id::Int(1),
            record(&[
                ("id", Value::Id(Id::Int(1))),
                ("name", Value::Text("admin".into())),
            ]),
        );
        TwoTables {
            addresses,
            roles,
            user_roles: vec![(Id::Int(1), Id::Int(1))],
        }
    }

    #[test]
    fn dotted_path_through_foreign_key() {
        let resolver = two_tables();
        let user = record(&[
            ("id", Value::Id(Id::Int(1))),
            ("address", Value::Id(Id::Int(1))),
        ]);
        let cond = parse("address.state == 'NY'").unwrap();
        assert!(Evaluator::new(&resolver)
            .matches(&cond, "user", &user, &Params::new())
            .unwrap());
        let cond = parse("address.state == 'CA'").unwrap();
        assert!(!Evaluator::new(&resolver)
            .matches(&cond, "user", &user, &Params::new())
            .unwrap());
    }

    #[test]
    fn dotted_path_through_relationship() {
        let resolver = two_tables();
        let user = record(&[("id", Value::Id(Id::Int(1)))]);
        let cond = parse("roles.name == 'admin'").unwrap();
        assert!(Evaluator::new(&resolver)
            .matches(&cond, "user", &user, &Params::new())
            .unwrap());
    }

    #[test]
    fn id_pseudo_field() {
        let resolver = two_tables();
        let user = record(&[("id", Value::Id(Id::Int(7)))]);
        let cond = parse("#ID == 7").unwrap();
        assert!(Evaluator::new(&resolver)
            .matches(&cond, "user", &user, &Params::new())
            .unwrap());
    }

    #[test]
    fn dangling_reference_yields_no_match() {
        let resolver = two_tables();
        let user = record(&[
            ("id", Value::Id(Id::Int(2))),
            ("address", Value::Id(Id::Int(99))),
        ]);
        let cond = parse("address.state == 'NY'").unwrap();
        assert!(!Evaluator::new(&resolver)
            .matches(&cond, "user", &user, &Params::new())
            .unwrap());
    }
}
