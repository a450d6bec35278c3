//! SQL Server type mapping to JSON values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tiberius::Row;
use uuid::Uuid;

/// A SQL value extracted from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Decimal(Decimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl SqlValue {
    /// Convert to a JSON value for the tool response payload.
    ///
    /// Decimals and temporal values are rendered as strings so precision
    /// survives the trip through JSON.
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(v) => Value::Bool(*v),
            SqlValue::I16(v) => Value::from(*v),
            SqlValue::I32(v) => Value::from(*v),
            SqlValue::I64(v) => Value::from(*v),
            SqlValue::F32(v) => Value::from(*v),
            SqlValue::F64(v) => Value::from(*v),
            SqlValue::String(v) => Value::String(v.clone()),
            SqlValue::Decimal(v) => Value::String(v.to_string()),
            SqlValue::Uuid(v) => Value::String(v.to_string()),
            SqlValue::Date(v) => Value::String(v.to_string()),
            SqlValue::Time(v) => Value::String(v.to_string()),
            SqlValue::DateTime(v) => Value::String(v.to_string()),
            SqlValue::DateTimeUtc(v) => Value::String(v.to_rfc3339()),
            SqlValue::Binary(v) => Value::String(format!("0x{}", hex_encode(v))),
        }
    }
}

/// Extract a value from a tiberius row column.
///
/// Tries each type in order of likelihood; unsupported types fall back to
/// NULL rather than failing the whole row.
pub fn extract_column(row: &Row, idx: usize) -> SqlValue {
    if row.columns().get(idx).is_none() {
        return SqlValue::Null;
    }

    // Strings (most common)
    if let Some(v) = row.try_get::<&str, _>(idx).ok().flatten() {
        return SqlValue::String(v.to_string());
    }

    // Integers
    if let Some(v) = row.try_get::<i32, _>(idx).ok().flatten() {
        return SqlValue::I32(v);
    }
    if let Some(v) = row.try_get::<i64, _>(idx).ok().flatten() {
        return SqlValue::I64(v);
    }
    if let Some(v) = row.try_get::<i16, _>(idx).ok().flatten() {
        return SqlValue::I16(v);
    }
    // TINYINT surfaces as u8 in tiberius
    if let Some(v) = row.try_get::<u8, _>(idx).ok().flatten() {
        return SqlValue::I16(v as i16);
    }

    // Floating point
    if let Some(v) = row.try_get::<f64, _>(idx).ok().flatten() {
        return SqlValue::F64(v);
    }
    if let Some(v) = row.try_get::<f32, _>(idx).ok().flatten() {
        return SqlValue::F32(v);
    }

    // Decimal
    if let Some(v) = row.try_get::<Decimal, _>(idx).ok().flatten() {
        return SqlValue::Decimal(v);
    }

    // Boolean
    if let Some(v) = row.try_get::<bool, _>(idx).ok().flatten() {
        return SqlValue::Bool(v);
    }

    // UUID
    if let Some(v) = row.try_get::<Uuid, _>(idx).ok().flatten() {
        return SqlValue::Uuid(v);
    }

    // Date/Time types
    if let Some(v) = row.try_get::<NaiveDateTime, _>(idx).ok().flatten() {
        return SqlValue::DateTime(v);
    }
    if let Some(v) = row.try_get::<NaiveDate, _>(idx).ok().flatten() {
        return SqlValue::Date(v);
    }
    if let Some(v) = row.try_get::<NaiveTime, _>(idx).ok().flatten() {
        return SqlValue::Time(v);
    }

    // Binary
    if let Some(v) = row.try_get::<&[u8], _>(idx).ok().flatten() {
        return SqlValue::Binary(v.to_vec());
    }

    SqlValue::Null
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_json_conversion() {
        assert_eq!(SqlValue::Null.to_json(), Value::Null);
        assert_eq!(SqlValue::I32(42).to_json(), json!(42));
        assert_eq!(SqlValue::Bool(true).to_json(), json!(true));
        assert_eq!(
            SqlValue::String("hello".to_string()).to_json(),
            json!("hello")
        );
    }

    #[test]
    fn test_decimal_renders_as_string() {
        let value = SqlValue::Decimal("19.99".parse().unwrap());
        assert_eq!(value.to_json(), json!("19.99"));
    }

    #[test]
    fn test_binary_renders_as_hex() {
        let value = SqlValue::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(value.to_json(), json!("0xDEADBEEF"));
    }

    #[test]
    fn test_datetime_utc_renders_rfc3339() {
        let dt = DateTime::parse_from_rfc3339("2026-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(SqlValue::DateTimeUtc(dt).to_json(), json!("2026-01-15T10:30:00+00:00"));
    }
}
