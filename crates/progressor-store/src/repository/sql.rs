//! Value binding, row decoding and error mapping.

use progressor_core::{
    entity::{Column, ColumnType, EntityKind, Record},
    error::ProgressorError,
};
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

pub(crate) type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a coerced column value.
pub(crate) fn bind<'q>(query: Query<'q>, value: &Value) -> Query<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        // Coercion never yields these; store their JSON text.
        other => query.bind(other.to_string()),
    }
}

/// Decode every declared column of `kind` from `row`.
pub(crate) fn decode(kind: EntityKind, row: &SqliteRow) -> Result<Record, ProgressorError> {
    kind.columns()
        .iter()
        .map(|column| {
            decode_column(row, column)
                .map(|value| (column.name.to_string(), value))
                .map_err(|e| {
                    ProgressorError::Storage(format!(
                        "failed to decode {kind}.{}: {e}",
                        column.name
                    ))
                })
        })
        .collect()
}

fn decode_column(row: &SqliteRow, column: &Column) -> Result<Value, sqlx::Error> {
    let name = column.name;
    let value = match column.ty {
        ColumnType::Text => row.try_get::<Option<String>, _>(name)?.map(Value::from),
        ColumnType::Integer => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
        ColumnType::Real => match row.try_get::<Option<f64>, _>(name) {
            Ok(v) => v.map(Value::from),
            Err(_) => row
                .try_get::<Option<i64>, _>(name)?
                .map(|i| Value::from(i as f64)),
        },
        ColumnType::Boolean => match row.try_get::<Option<bool>, _>(name) {
            Ok(v) => v.map(Value::from),
            Err(_) => row
                .try_get::<Option<i64>, _>(name)?
                .map(|i| Value::from(i != 0)),
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Map a driver error, separating integrity violations from other failures.
pub(crate) fn storage_err(context: &str, e: sqlx::Error) -> ProgressorError {
    if let sqlx::Error::Database(db) = &e {
        match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => {
                return ProgressorError::Constraint(format!("{context}: {}", db.message()));
            }
            _ if db.message().contains("constraint failed") => {
                return ProgressorError::Constraint(format!("{context}: {}", db.message()));
            }
            _ => {}
        }
    }
    ProgressorError::Storage(format!("{context}: {e}"))
}
