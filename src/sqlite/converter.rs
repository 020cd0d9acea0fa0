// ABOUTME: SQLite <-> JSON value conversion for rows and bound parameters
// ABOUTME: Handles all SQLite storage classes with BLOB base64 encoding

use base64::Engine as _;
use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;

/// Convert a single SQLite value to JSON
///
/// Maps SQLite types to JSON types:
/// - INTEGER → number (i64)
/// - REAL → number (f64), non-finite values as strings
/// - TEXT → string
/// - BLOB → object `{"_type": "blob", "data": "<base64>"}`
/// - NULL → null
///
/// # Examples
///
/// ```
/// # use rowsync::sqlite::converter::sqlite_value_to_json;
/// # use rusqlite::types::Value;
/// assert_eq!(sqlite_value_to_json(&Value::Integer(42)), serde_json::json!(42));
/// ```
pub fn sqlite_value_to_json(value: &SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::Number((*i).into()),
        SqlValue::Real(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(f.to_string())),
        SqlValue::Text(s) => JsonValue::String(s.clone()),
        SqlValue::Blob(b) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(b);
            serde_json::json!({
                "_type": "blob",
                "data": encoded
            })
        }
    }
}

/// Convert a JSON value to a SQLite parameter
///
/// Booleans bind as 0/1. Blob objects produced by [`sqlite_value_to_json`]
/// bind back as BLOBs; any other array or object binds as its JSON text.
pub fn json_to_sqlite_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        JsonValue::Object(map) => match decode_blob(map) {
            Some(bytes) => SqlValue::Blob(bytes),
            None => SqlValue::Text(value.to_string()),
        },
        JsonValue::Array(_) => SqlValue::Text(value.to_string()),
    }
}

fn decode_blob(map: &serde_json::Map<String, JsonValue>) -> Option<Vec<u8>> {
    if map.len() != 2 || map.get("_type")?.as_str()? != "blob" {
        return None;
    }
    let data = map.get("data")?.as_str()?;
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}
