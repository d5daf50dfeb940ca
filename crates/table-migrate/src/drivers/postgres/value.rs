//! Conversion between PostgreSQL wire values and [`SqlValue`].
//!
//! Types with a native decoding travel in binary. Every other type (enums,
//! arrays, ranges, `interval`, `inet`, `money`, ...) is selected as `::text`
//! and cast back from text on insert, so the server does the conversion.

use std::error::Error;

use bytes::BytesMut;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};

use crate::core::{Column, Row, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

/// Underlying type names decoded by [`decode_row`] without a text cast.
const NATIVE_TYPES: &[&str] = &[
    "bool", "int2", "int4", "int8", "oid", "float4", "float8", "numeric", "uuid", "timestamp",
    "timestamptz", "date", "time", "bytea", "json", "jsonb", "text", "varchar", "bpchar", "name",
    "citext",
];

/// Whether values of this column are carried as text.
///
/// Columns without catalog type information are assumed native.
pub(crate) fn is_text_transported(column: &Column) -> bool {
    !column.udt_name.is_empty() && !NATIVE_TYPES.contains(&column.udt_name.as_str())
}

/// Decode every cell of a fetched row, in result column order.
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn decode_cell(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue<'static>> {
    let ty = row.columns()[idx].type_();
    match *ty {
        Type::BOOL => cell(row, idx, SqlValue::Bool, SqlNullType::Bool),
        Type::INT2 => cell(row, idx, SqlValue::I16, SqlNullType::I16),
        Type::INT4 => cell(row, idx, SqlValue::I32, SqlNullType::I32),
        Type::INT8 => cell(row, idx, SqlValue::I64, SqlNullType::I64),
        Type::OID => cell(row, idx, |v: u32| SqlValue::I64(i64::from(v)), SqlNullType::I64),
        Type::FLOAT4 => cell(row, idx, SqlValue::F32, SqlNullType::F32),
        Type::FLOAT8 => cell(row, idx, SqlValue::F64, SqlNullType::F64),
        Type::NUMERIC => cell(row, idx, SqlValue::Decimal, SqlNullType::Decimal),
        Type::UUID => cell(row, idx, SqlValue::Uuid, SqlNullType::Uuid),
        Type::TIMESTAMP => cell(row, idx, SqlValue::DateTime, SqlNullType::DateTime),
        Type::TIMESTAMPTZ => cell(
            row,
            idx,
            SqlValue::DateTimeOffset,
            SqlNullType::DateTimeOffset,
        ),
        Type::DATE => cell(row, idx, SqlValue::Date, SqlNullType::Date),
        Type::TIME => cell(row, idx, SqlValue::Time, SqlNullType::Time),
        Type::BYTEA => cell(row, idx, SqlValue::bytes_owned, SqlNullType::Bytes),
        Type::JSON | Type::JSONB => cell(row, idx, SqlValue::Json, SqlNullType::Json),
        _ => cell(row, idx, SqlValue::text_owned, SqlNullType::String).map_err(|_| {
            MigrateError::MigrationFailed(format!(
                "cannot read column {} of type {}",
                row.columns()[idx].name(),
                ty
            ))
        }),
    }
}

fn cell<'a, T, F>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    wrap: F,
    null: SqlNullType,
) -> Result<SqlValue<'static>>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue<'static>,
{
    Ok(match row.try_get::<_, Option<T>>(idx)? {
        Some(v) => wrap(v),
        None => SqlValue::Null(null),
    })
}

type EncodeResult = std::result::Result<IsNull, Box<dyn Error + Sync + Send>>;

/// Integers are narrowed or widened to the parameter's width.
fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> EncodeResult {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

impl ToSql for SqlValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        match self {
            SqlValue::Null(_) => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I16(v) => encode_int(i64::from(*v), ty, out),
            SqlValue::I32(v) => encode_int(i64::from(*v), ty, out),
            SqlValue::I64(v) => encode_int(*v, ty, out),
            SqlValue::F32(v) => match *ty {
                Type::FLOAT8 => f64::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::F64(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => <&str as ToSql>::to_sql(&v.as_ref(), ty, out),
            SqlValue::Bytes(v) => <&[u8] as ToSql>::to_sql(&v.as_ref(), ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::DateTime(v) => v.to_sql(ty, out),
            SqlValue::DateTimeOffset(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
        }
    }

    // The server rejects a mismatched parameter per row, which surfaces as
    // a failed row rather than a failed batch.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
