//! Dynamic row value type.

use crate::{Id, Record};
use chrono::NaiveTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// A dynamic value carried through table rows.
///
/// Stored rows only ever hold the scalar and identifier variants; the
/// `Record`/`Records` variants appear in materialized read results, where
/// the relationship resolver has substituted a foreign-key identifier (or
/// a relationship field) with the target row(s).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Exact decimal number.
    Decimal(Decimal),
    /// Floating point number.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Timestamp, milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Time of day.
    Time(NaiveTime),
    /// Binary blob.
    Bytes(Vec<u8>),
    /// Row identifier (foreign-key column or primary key).
    Id(Id),
    /// List of row identifiers.
    IdList(Vec<Id>),
    /// General value list. Never stored in a row; carries list-valued
    /// query parameters (`IN` lists) and enum batches.
    List(Vec<Value>),
    /// A materialized target row (resolved foreign key).
    Record(Record),
    /// Materialized target rows (resolved relationship field).
    Records(Vec<Record>),
}

impl Value {
    /// Returns a short name for the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Decimal(_) => "decimal",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Time(_) => "time",
            Self::Bytes(_) => "bytes",
            Self::Id(_) => "id",
            Self::IdList(_) => "id_list",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Records(_) => "records",
        }
    }

    /// Check if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a blob.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as an identifier, if it is one.
    #[must_use]
    pub fn as_id(&self) -> Option<&Id> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Get this value as an identifier list, if it is one.
    #[must_use]
    pub fn as_id_list(&self) -> Option<&[Id]> {
        match self {
            Self::IdList(ids) => Some(ids),
            _ => None,
        }
    }

    /// Get this value as a general list, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get this value as a materialized record, if it is one.
    #[must_use]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Get this value as materialized records, if it is a record list.
    #[must_use]
    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Self::Records(r) => Some(r),
            _ => None,
        }
    }

    /// The numeric magnitude of this value, if it has one.
    ///
    /// Integers, floats, decimals and timestamps share a numeric axis so
    /// the condition engine can compare across representations (a JSON
    /// parameter arrives as `Int` even when the column is `Timestamp`).
    fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Int(n) | Self::Timestamp(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Equality with representation coercion.
    ///
    /// - numeric variants compare by magnitude
    /// - an identifier compares equal to its underlying integer / text form
    /// - a time compares equal to its `HH:MM:SS` rendering
    ///
    /// Everything else falls back to strict equality.
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Id(Id::Int(a)), Self::Int(b)) | (Self::Int(b), Self::Id(Id::Int(a))) => a == b,
            (Self::Id(Id::Hash(a)), Self::Text(b)) | (Self::Text(b), Self::Id(Id::Hash(a))) => {
                a == b
            }
            (Self::Time(t), Self::Text(s)) | (Self::Text(s), Self::Time(t)) => {
                t.format("%H:%M:%S").to_string() == *s
            }
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Ordering with representation coercion, for `<` / `<=` / `>` / `>=`.
    ///
    /// Returns `None` when the two values are not comparable.
    #[must_use]
    pub fn loose_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Id(a), Self::Id(b)) => Some(a.cmp(b)),
            _ => match (self.as_numeric(), other.as_numeric()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Self::Time(t)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Self::Id(id)
    }
}

impl From<Vec<Id>> for Value {
    fn from(ids: Vec<Id>) -> Self {
        Self::IdList(ids)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for Value {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Vec<Record>> for Value {
    fn from(records: Vec<Record>) -> Self {
        Self::Records(records)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Text("x".into()).as_text(), Some("x"));
        assert_eq!(Value::Int(42).as_text(), None);
        assert_eq!(Value::Id(Id::Int(1)).as_id(), Some(&Id::Int(1)));
    }

    #[test]
    fn loose_eq_across_numeric_variants() {
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert!(Value::Decimal(Decimal::from_str("3.0").unwrap()).loose_eq(&Value::Int(3)));
        assert!(!Value::Int(3).loose_eq(&Value::Float(3.5)));
    }

    #[test]
    fn loose_eq_id_against_scalar() {
        assert!(Value::Id(Id::Int(7)).loose_eq(&Value::Int(7)));
        assert!(Value::Id(Id::Hash("ab".into())).loose_eq(&Value::Text("ab".into())));
        assert!(!Value::Id(Id::Int(7)).loose_eq(&Value::Int(8)));
    }

    #[test]
    fn loose_cmp_text_and_numeric() {
        assert_eq!(
            Value::Text("a".into()).loose_cmp(&Value::Text("b".into())),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(2).loose_cmp(&Value::Float(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::Int(2).loose_cmp(&Value::Text("x".into())), None);
    }

    #[test]
    fn timestamp_compares_with_int() {
        assert!(Value::Timestamp(1_000).loose_eq(&Value::Int(1_000)));
        assert_eq!(
            Value::Timestamp(5).loose_cmp(&Value::Timestamp(9)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn time_compares_with_text() {
        let t = NaiveTime::from_hms_opt(13, 45, 0).unwrap();
        assert!(Value::Time(t).loose_eq(&Value::Text("13:45:00".into())));
    }

    #[test]
    fn from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }
}
