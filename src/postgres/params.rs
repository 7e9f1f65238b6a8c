use std::error::Error;

use chrono::{DateTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::RowValues;

/// Borrowed Postgres parameters for one statement.
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let references = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Params { references }
    }

    /// Get a reference to the underlying parameter array
    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

// The server infers each `$n` type from context, so one loosely typed value has to fit
// whatever column it lands in: integers narrow to int2/int4, scalars render as text.
impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                _ => i.to_string().to_sql(ty, out),
            },
            RowValues::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                _ => f.to_string().to_sql(ty, out),
            },
            RowValues::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::INT2 => i16::from(*b).to_sql(ty, out),
                Type::INT4 => i32::from(*b).to_sql(ty, out),
                Type::INT8 => i64::from(*b).to_sql(ty, out),
                _ => b.to_string().to_sql(ty, out),
            },
            RowValues::Text(s) => match *ty {
                Type::INT2 | Type::INT4 | Type::INT8 => {
                    RowValues::Int(s.trim().parse()?).to_sql(ty, out)
                }
                Type::FLOAT4 | Type::FLOAT8 => RowValues::Float(s.trim().parse()?).to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                _ => s.to_sql(ty, out),
            },
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => DateTime::<Utc>::from_naive_utc_and_offset(*dt, Utc).to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                Type::TIMESTAMP => dt.to_sql(ty, out),
                _ => dt.format("%F %T%.f").to_string().to_sql(ty, out),
            },
            RowValues::JSON(jsval) => match *ty {
                Type::JSON | Type::JSONB => jsval.to_sql(ty, out),
                _ => jsval.to_string().to_sql(ty, out),
            },
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_text(ty)
            || matches!(
                *ty,
                Type::INT2
                    | Type::INT4
                    | Type::INT8
                    | Type::FLOAT4
                    | Type::FLOAT8
                    | Type::BOOL
                    | Type::TIMESTAMP
                    | Type::TIMESTAMPTZ
                    | Type::DATE
                    | Type::JSON
                    | Type::JSONB
                    | Type::BYTEA
            )
    }

    to_sql_checked!();
}
