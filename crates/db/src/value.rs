// crates/db/src/value.rs
//! Typed bind values and row→JSON conversion.
//!
//! `SqlValue` is the narrow waist between services and the generic
//! operations in `ops.rs`: callers describe a row as `(column, SqlValue)`
//! pairs and get rows back as `serde_json::Value` objects, which the typed
//! row structs in `rows.rs` deserialize from. JSONB columns round-trip
//! through `serde_json::Value` untouched, so structured payloads are
//! serialized and parsed only here.
//!
//! Every variant wraps an `Option` so a NULL is bound with the column's
//! type: a `Json(None)` lands as a jsonb NULL, a `Text(None)` as a text
//! NULL. An untyped NULL would fail Postgres parameter-type inference on
//! insert.

use crate::{DbError, DbResult};
use serde_json::{json, Map, Value as Json};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, Postgres, Row, TypeInfo};
use tracing::warn;
use uuid::Uuid;

/// A bindable SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Json(Option<Json>),
    IntArray(Option<Vec<i64>>),
    TextArray(Option<Vec<String>>),
    UuidArray(Option<Vec<Uuid>>),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(Some(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(Some(v as i64))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(Some(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(Some(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(Some(v))
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(Some(v))
    }
}

impl From<Json> for SqlValue {
    fn from(v: Json) -> Self {
        SqlValue::Json(Some(v))
    }
}

impl From<Vec<i64>> for SqlValue {
    fn from(v: Vec<i64>) -> Self {
        SqlValue::IntArray(Some(v))
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::TextArray(Some(v))
    }
}

impl From<Vec<Uuid>> for SqlValue {
    fn from(v: Vec<Uuid>) -> Self {
        SqlValue::UuidArray(Some(v))
    }
}

impl From<Option<bool>> for SqlValue {
    fn from(v: Option<bool>) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        SqlValue::Int(v)
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Option<&str>> for SqlValue {
    fn from(v: Option<&str>) -> Self {
        SqlValue::Text(v.map(|s| s.to_string()))
    }
}

impl From<Option<Uuid>> for SqlValue {
    fn from(v: Option<Uuid>) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Option<Json>> for SqlValue {
    fn from(v: Option<Json>) -> Self {
        SqlValue::Json(v)
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;
type PgQueryAs<'q, T> = sqlx::query::QueryAs<'q, Postgres, T, PgArguments>;

/// Bind one value onto a query.
pub fn bind_value(query: PgQuery<'_>, value: SqlValue) -> PgQuery<'_> {
    match value {
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Uuid(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(v),
        SqlValue::IntArray(v) => query.bind(v),
        SqlValue::TextArray(v) => query.bind(v),
        SqlValue::UuidArray(v) => query.bind(v),
    }
}

/// Bind one value onto a typed query.
pub fn bind_value_as<T>(query: PgQueryAs<'_, T>, value: SqlValue) -> PgQueryAs<'_, T> {
    match value {
        SqlValue::Bool(v) => query.bind(v),
        SqlValue::Int(v) => query.bind(v),
        SqlValue::Float(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Uuid(v) => query.bind(v),
        SqlValue::Json(v) => query.bind(v),
        SqlValue::IntArray(v) => query.bind(v),
        SqlValue::TextArray(v) => query.bind(v),
        SqlValue::UuidArray(v) => query.bind(v),
    }
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Json, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(|v| json!(v)),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| json!(v)),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|v| json!(v)),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(|v| json!(v)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|v| json!(v)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(|v| json!(v)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            row.try_get::<Option<String>, _>(idx)?.map(Json::String)
        }
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(|v| Json::String(v.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Json>, _>(idx)?,
        "TEXT[]" | "VARCHAR[]" => row.try_get::<Option<Vec<String>>, _>(idx)?.map(|v| json!(v)),
        "INT4[]" => row.try_get::<Option<Vec<i32>>, _>(idx)?.map(|v| json!(v)),
        "INT8[]" => row.try_get::<Option<Vec<i64>>, _>(idx)?.map(|v| json!(v)),
        "UUID[]" => row
            .try_get::<Option<Vec<Uuid>>, _>(idx)?
            .map(|v| json!(v.iter().map(|u| u.to_string()).collect::<Vec<_>>())),
        "JSONB[]" | "JSON[]" => row.try_get::<Option<Vec<Json>>, _>(idx)?.map(Json::Array),
        other => {
            // Last resort: read as text so unknown types degrade loudly
            // instead of failing the whole row.
            warn!(pg_type = other, "unhandled column type, decoding as text");
            row.try_get::<Option<String>, _>(idx)?.map(Json::String)
        }
    };
    Ok(value.unwrap_or(Json::Null))
}

/// Convert a PostgreSQL row into a JSON object keyed by column name.
pub fn row_to_json(row: &PgRow) -> DbResult<Json> {
    let mut map = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())
            .map_err(|e| DbError::Decode(format!("column '{}': {e}", column.name())))?;
        map.insert(column.name().to_string(), value);
    }
    Ok(Json::Object(map))
}

/// Convert a batch of rows.
pub fn rows_to_json(rows: &[PgRow]) -> DbResult<Vec<Json>> {
    rows.iter().map(row_to_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_impls() {
        assert_eq!(SqlValue::from(7i64), SqlValue::Int(Some(7)));
        assert_eq!(SqlValue::from(7i32), SqlValue::Int(Some(7)));
        assert_eq!(SqlValue::from(true), SqlValue::Bool(Some(true)));
        assert_eq!(SqlValue::from("x"), SqlValue::Text(Some("x".into())));
        assert_eq!(SqlValue::from(Option::<i64>::None), SqlValue::Int(None));
        assert_eq!(SqlValue::from(Some(3i64)), SqlValue::Int(Some(3)));
        assert_eq!(
            SqlValue::from(vec![1i64, 2]),
            SqlValue::IntArray(Some(vec![1, 2]))
        );
        let u = Uuid::new_v4();
        assert_eq!(SqlValue::from(u), SqlValue::Uuid(Some(u)));
        assert_eq!(
            SqlValue::from(json!({"a": 1})),
            SqlValue::Json(Some(json!({"a": 1})))
        );
        assert_eq!(SqlValue::from(Option::<Json>::None), SqlValue::Json(None));
    }
}
