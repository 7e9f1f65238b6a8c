use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
///
/// Booleans become 0/1, timestamps ISO-ish text, JSON its serialized text.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Owned `SQLite` parameters, ready to move onto the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct Params(pub Vec<Value>);

impl Params {
    #[must_use]
    pub fn convert(params: &[RowValues]) -> Self {
        Params(params.iter().map(row_value_to_sqlite_value).collect())
    }

    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_every_variant() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .map(RowValues::Timestamp)
            .unwrap_or(RowValues::Null);
        let params = Params::convert(&[
            RowValues::Int(1),
            RowValues::Bool(true),
            RowValues::Null,
            RowValues::JSON(serde_json::json!({"a": 1})),
            ts,
        ]);
        assert_eq!(
            params.as_values(),
            &[
                Value::Integer(1),
                Value::Integer(1),
                Value::Null,
                Value::Text("{\"a\":1}".into()),
                Value::Text("2024-05-01 08:30:00".into()),
            ]
        );
    }
}
