//! Row materialization
//!
//! Turns driver rows into ordered column-name keyed maps of JSON values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSqlOwned, Type};
use postgres::Row;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use crate::prelude::PgSummaryError;

/// One result row, keyed by column name in result column order
pub type RowMap = Map<String, JsonValue>;

/// Forward-only sequence of row maps
///
/// Rows are handed out once and cannot be rewound. Collect into a `Vec` if
/// they need to be read twice.
#[derive(Debug)]
pub struct RowDicts {
    rows: std::vec::IntoIter<Row>,
}

impl RowDicts {
    pub(crate) fn new(rows: std::vec::IntoIter<Row>) -> Self {
        Self { rows }
    }
}

impl Iterator for RowDicts {
    type Item = Result<RowMap, PgSummaryError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| row_to_map(&row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for RowDicts {}

/// Convert a row into an ordered map
pub fn row_to_map(row: &Row) -> Result<RowMap, PgSummaryError> {
    let mut map = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, idx)?);
    }
    Ok(map)
}

fn get<T: FromSqlOwned>(row: &Row, idx: usize) -> Result<Option<T>, PgSummaryError> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| PgSummaryError::query(&e))
}

/// Extract a column value as a JSON value
fn column_value(row: &Row, idx: usize) -> Result<JsonValue, PgSummaryError> {
    let ty = row.columns()[idx].type_();

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(JsonValue::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(JsonValue::from),
        Type::INT4 => get::<i32>(row, idx)?.map(JsonValue::from),
        Type::INT8 => get::<i64>(row, idx)?.map(JsonValue::from),
        Type::OID => get::<u32>(row, idx)?.map(JsonValue::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|n| float_value(f64::from(n))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(float_value),
        // Kept as text so no precision is lost
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(|d| JsonValue::String(d.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(JsonValue::String)
        }
        Type::JSON | Type::JSONB => get::<JsonValue>(row, idx)?,
        Type::UUID => get::<Uuid>(row, idx)?.map(|u| JsonValue::String(u.to_string())),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(|d| JsonValue::String(d.to_string())),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(|t| JsonValue::String(t.to_string())),
        Type::TIMESTAMP => {
            get::<NaiveDateTime>(row, idx)?.map(|ts| JsonValue::String(ts.to_string()))
        }
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx)?.map(|ts| JsonValue::String(ts.to_rfc3339()))
        }
        _ => {
            debug!(
                column = ?row.columns()[idx].name(),
                pg_type = ?ty.name(),
                "Unsupported column type, value reported as null"
            );
            None
        }
    };

    Ok(value.unwrap_or(JsonValue::Null))
}

/// NaN and infinities have no JSON number form
fn float_value(n: f64) -> JsonValue {
    Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(n.to_string()))
}
