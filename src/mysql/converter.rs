// ABOUTME: MySQL <-> JSON value conversion for rows and bound parameters
// ABOUTME: Formats temporal values as text and base64-encodes non-UTF-8 bytes

use base64::Engine as _;
use chrono::NaiveDate;
use mysql_async::Value as MyValue;
use serde_json::Value as JsonValue;

/// Convert a MySQL value (binary protocol) to JSON
///
/// - integers → numbers
/// - FLOAT/DOUBLE → numbers, non-finite values as strings
/// - byte strings → strings when valid UTF-8, otherwise a base64 blob object
/// - DATE/DATETIME/TIMESTAMP → `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS[.ffffff]`
/// - TIME → `[-]HHH:MM:SS[.ffffff]`
pub fn mysql_value_to_json(value: &MyValue) -> JsonValue {
    match value {
        MyValue::NULL => JsonValue::Null,
        MyValue::Int(i) => JsonValue::Number((*i).into()),
        MyValue::UInt(u) => JsonValue::Number((*u).into()),
        MyValue::Float(f) => float_to_json(f64::from(*f)),
        MyValue::Double(d) => float_to_json(*d),
        MyValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s.to_string()),
            Err(_) => serde_json::json!({
                "_type": "blob",
                "data": base64::engine::general_purpose::STANDARD.encode(bytes)
            }),
        },
        MyValue::Date(year, month, day, hour, minute, second, micros) => {
            format_datetime(*year, *month, *day, *hour, *minute, *second, *micros)
        }
        MyValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = *days * 24 + u32::from(*hours);
            let mut text = format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            JsonValue::String(text)
        }
    }
}

fn float_to_json(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(f.to_string()))
}

fn format_datetime(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> JsonValue {
    let Some(date) = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
    else {
        // Zero dates ('0000-00-00') have no calendar representation
        return JsonValue::String(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
        ));
    };

    if hour == 0 && minute == 0 && second == 0 && micros == 0 {
        return JsonValue::String(date.format("%Y-%m-%d").to_string());
    }

    match date.and_hms_micro_opt(
        u32::from(hour),
        u32::from(minute),
        u32::from(second),
        micros,
    ) {
        Some(dt) if micros > 0 => JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        Some(dt) => JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        None => JsonValue::Null,
    }
}

/// Convert a JSON value to a MySQL parameter
///
/// Booleans bind as 0/1; arrays and objects bind as their JSON text, except
/// blob objects which bind back as raw bytes.
pub fn json_to_mysql_value(value: &JsonValue) -> MyValue {
    match value {
        JsonValue::Null => MyValue::NULL,
        JsonValue::Bool(b) => MyValue::Int(i64::from(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MyValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                MyValue::UInt(u)
            } else {
                MyValue::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => MyValue::Bytes(s.as_bytes().to_vec()),
        JsonValue::Object(map) => {
            let blob = map
                .get("_type")
                .and_then(JsonValue::as_str)
                .filter(|t| *t == "blob" && map.len() == 2)
                .and_then(|_| map.get("data").and_then(JsonValue::as_str))
                .and_then(|data| base64::engine::general_purpose::STANDARD.decode(data).ok());
            match blob {
                Some(bytes) => MyValue::Bytes(bytes),
                None => MyValue::Bytes(value.to_string().into_bytes()),
            }
        }
        JsonValue::Array(_) => MyValue::Bytes(value.to_string().into_bytes()),
    }
}
