//! JSON conversion for the external surface.
//!
//! Decimals render as canonical strings, timestamps as integer milliseconds
//! since the epoch, times of day as `HH:MM:SS`, blobs as lowercase hex.

use crate::{Id, Record, Value, ValueError, ValueResult};
use chrono::NaiveTime;
use serde_json::{json, Map};
use std::fmt::Write;

/// Converts a row value to its JSON form.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(n) => json!(n),
        Value::Decimal(d) => json!(d.to_string()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => json!(s),
        Value::Timestamp(ms) => json!(ms),
        Value::Time(t) => json!(t.format("%H:%M:%S").to_string()),
        Value::Bytes(bytes) => json!(hex_string(bytes)),
        Value::Id(id) => id_to_json(id),
        Value::IdList(ids) => serde_json::Value::Array(ids.iter().map(id_to_json).collect()),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Record(record) => record_to_json(record),
        Value::Records(records) => {
            serde_json::Value::Array(records.iter().map(record_to_json).collect())
        }
    }
}

/// Converts a record to a JSON object, keeping field order.
#[must_use]
pub fn record_to_json(record: &Record) -> serde_json::Value {
    let mut map = Map::with_capacity(record.len());
    for (name, value) in record.iter() {
        map.insert(name.to_string(), value_to_json(value));
    }
    serde_json::Value::Object(map)
}

/// Reconstructs a record from a JSON object.
///
/// This is the untyped direction: numbers become `Int`/`Float`, strings
/// become `Text`, arrays of numbers become identifier lists, arrays of
/// objects become nested records. Schema-aware coercion (timestamps,
/// enums, blobs) is layered on top by the schema registry.
pub fn record_from_json(json: &serde_json::Value) -> ValueResult<Record> {
    let object = json
        .as_object()
        .ok_or_else(|| ValueError::invalid_json(format!("expected object, got {json}")))?;
    let mut record = Record::new();
    for (name, value) in object {
        record.set(name.clone(), value_from_json(value)?);
    }
    Ok(record)
}

fn value_from_json(json: &serde_json::Value) -> ValueResult<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                return Err(ValueError::invalid_json(format!("unrepresentable number {n}")));
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            if items.iter().all(serde_json::Value::is_object) {
                let records = items
                    .iter()
                    .map(record_from_json)
                    .collect::<ValueResult<Vec<_>>>()?;
                Value::Records(records)
            } else if items.iter().all(|v| v.is_i64()) {
                let ids = items
                    .iter()
                    .filter_map(serde_json::Value::as_i64)
                    .map(Id::Int)
                    .collect();
                Value::IdList(ids)
            } else {
                let items = items
                    .iter()
                    .map(value_from_json)
                    .collect::<ValueResult<Vec<_>>>()?;
                Value::List(items)
            }
        }
        serde_json::Value::Object(_) => Value::Record(record_from_json(json)?),
    })
}

fn id_to_json(id: &Id) -> serde_json::Value {
    match id {
        Id::Int(n) => json!(n),
        Id::Hash(h) => json!(h),
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Parses a `HH:MM:SS` time-of-day string.
pub fn parse_time(text: &str) -> ValueResult<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .map_err(|e| ValueError::invalid_json(format!("invalid time {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn scalars_to_json() {
        assert_eq!(value_to_json(&Value::Null), serde_json::Value::Null);
        assert_eq!(value_to_json(&Value::Int(5)), json!(5));
        assert_eq!(
            value_to_json(&Value::Decimal(Decimal::from_str("10.50").unwrap())),
            json!("10.50")
        );
        assert_eq!(value_to_json(&Value::Timestamp(1_700_000)), json!(1_700_000));
        assert_eq!(value_to_json(&Value::Bytes(vec![0xde, 0xad])), json!("dead"));
    }

    #[test]
    fn time_renders_hms() {
        let t = NaiveTime::from_hms_opt(9, 5, 1).unwrap();
        assert_eq!(value_to_json(&Value::Time(t)), json!("09:05:01"));
        assert_eq!(parse_time("09:05:01").unwrap(), t);
    }

    #[test]
    fn record_round_trip() {
        let mut record = Record::new();
        record.set("email", "joe@x.com");
        record.set("age", 31);
        record.set("address", Value::Id(Id::Int(1)));
        let json = record_to_json(&record);
        assert_eq!(json["email"], json!("joe@x.com"));
        assert_eq!(json["address"], json!(1));

        let back = record_from_json(&json).unwrap();
        assert_eq!(back.get("email"), Some(&Value::Text("joe@x.com".into())));
        // Untyped direction: the FK arrives as a plain integer.
        assert_eq!(back.get("address"), Some(&Value::Int(1)));
    }

    #[test]
    fn id_list_from_json() {
        let record = record_from_json(&json!({"roles": [1, 2]})).unwrap();
        assert_eq!(
            record.get("roles"),
            Some(&Value::IdList(vec![Id::Int(1), Id::Int(2)]))
        );
    }

    #[test]
    fn nested_objects_become_records() {
        let record = record_from_json(&json!({"address": {"state": "NY"}})).unwrap();
        let nested = record.get("address").and_then(Value::as_record).unwrap();
        assert_eq!(nested.get("state"), Some(&Value::Text("NY".into())));
    }

    #[test]
    fn mixed_array_becomes_list() {
        let record = record_from_json(&json!({"states": ["NY", "CA"]})).unwrap();
        assert_eq!(
            record.get("states"),
            Some(&Value::List(vec![
                Value::Text("NY".into()),
                Value::Text("CA".into())
            ]))
        );
    }
}
