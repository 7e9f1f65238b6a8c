use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters or read back from a row.
///
/// The same enum works for both backends, so callers never branch on driver types:
/// ```rust
/// use dual_sql::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("Ana".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// SQLite has no boolean storage class, so `0`/`1` integers read as booleans too.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Coerce a generated key into an integer.
    ///
    /// Drivers disagree on how they hand back an `id` column (`int4`, `int8`, numeric text),
    /// so anything that is unambiguously a whole number is accepted.
    #[must_use]
    pub fn as_generated_id(&self) -> Option<i64> {
        match self {
            RowValues::Int(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            RowValues::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            RowValues::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// JSON rendering used by the command-line runner.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::from(s.as_str()),
            RowValues::Bool(b) => JsonValue::from(*b),
            RowValues::Timestamp(dt) => JsonValue::from(dt.format("%F %T%.f").to_string()),
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(v) => v.clone(),
            RowValues::Blob(bytes) => JsonValue::from(bytes.clone()),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

/// The backend a [`crate::Database`] talks to. Fixed for the lifetime of the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Dialect {
    /// Embedded, file-backed `SQLite`
    #[value(alias = "sqlite3", alias = "file", alias = "embedded")]
    Sqlite,
    /// Client/server `PostgreSQL`
    #[value(alias = "postgresql", alias = "pg", alias = "pgsql", alias = "postgre")]
    Postgres,
}

impl Dialect {
    /// Parse a dialect name or one of its aliases, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        <Dialect as ValueEnum>::from_str(name.trim(), true).ok()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
