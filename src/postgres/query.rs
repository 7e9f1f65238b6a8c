use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::DualSqlError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DualSqlError` if the column cannot be decoded.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, DualSqlError> {
    let type_info = row.columns()[idx].type_();

    let value = match type_info.name() {
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(|v| RowValues::Int(i64::from(v))),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(|v| RowValues::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(RowValues::Timestamp),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        // text, varchar, bpchar, name and anything else with a text decoding
        _ => row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text),
    };
    Ok(value.unwrap_or(RowValues::Null))
}

/// Build a result set from raw Postgres rows.
///
/// # Errors
/// Returns errors from value extraction.
pub fn build_result_set_from_rows(rows: &[tokio_postgres::Row]) -> Result<ResultSet, DualSqlError> {
    let mut result_set = ResultSet::with_capacity(rows.len());
    if let Some(row) = rows.first() {
        let cols: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
        result_set.set_column_names(Arc::new(cols));
    }

    for row in rows {
        let col_count = row.columns().len();
        let mut row_values = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
