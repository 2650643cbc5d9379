use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

/// A value bound as a statement parameter.
#[derive(Debug, Clone)]
pub enum DbValue {
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Text (unlimited length)
    Text(String),
    /// Decimal string of unbounded magnitude (stored as NUMERIC)
    Numeric(String),
    /// Absolute timestamp (stored as TIMESTAMPTZ)
    TimestampTz(DateTime<Utc>),
    /// JSONB value
    JsonB(JsonValue),
}

impl DbValue {
    pub fn text(value: impl Into<String>) -> Self {
        DbValue::Text(value.into())
    }
}

/// A single write statement. Each operation compiles to exactly one SQL
/// statement, so it either fully applies or fully fails.
#[derive(Debug, Clone)]
pub enum DbOperation {
    /// INSERT with ON CONFLICT DO UPDATE (upsert)
    Upsert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        /// Columns that form the unique constraint
        conflict_columns: Vec<String>,
        /// Columns overwritten with the incoming value on conflict
        update_columns: Vec<String>,
        /// Optional `RETURNING` expression list
        returning: Option<String>,
    },
    /// DELETE with WHERE clause
    Delete {
        table: String,
        where_clause: WhereClause,
        returning: Option<String>,
    },
}

/// WHERE clause for DELETE operations.
#[derive(Debug, Clone)]
pub enum WhereClause {
    /// column = value
    Eq(String, DbValue),
}
