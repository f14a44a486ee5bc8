//! The backend contract: how connections are opened and statements run.
//!
//! Every backend implements [`Connector`] and [`Connection`], the test
//! double included. The pool and executor only ever see these
//! trait objects.

use async_trait::async_trait;
use schema::{Row, Value};

use crate::DriverError;

/// Parameter marker a backend expects in submitted SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?` (MySQL, SQLite)
    Question,
    /// `%s`, format-style drivers
    Format,
    /// `$1`, `$2`, ... numbered drivers
    Numbered,
}

/// Opens new connections for a pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Marker the backend's connections expect.
    fn param_style(&self) -> ParamStyle;

    async fn connect(&self) -> Result<Box<dyn Connection>, DriverError>;
}

/// One open connection. Used by one task at a time.
#[async_trait]
pub trait Connection: Send {
    /// Run a row-returning statement and fetch up to `limit` rows (all rows
    /// when `None`). Rows are keyed by column name.
    async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DriverError>;

    /// Run a mutating statement and return the affected-row count.
    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, DriverError>;

    /// Close the connection gracefully.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

// ---------------------------------------------------------------------------
// Column decoding
// ---------------------------------------------------------------------------

/// How a driver-reported column type is read back into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnClass {
    Bool,
    Int,
    /// An integer column that may hold values above `i64::MAX`.
    UnsignedInt,
    Float,
    DateTime,
    Date,
    Time,
    Bytes,
    Text,
}

impl ColumnClass {
    /// Classify a type name such as `BIGINT`, `VARCHAR` or `REAL`.
    pub(crate) fn of(type_name: &str) -> Self {
        let name = type_name.to_ascii_uppercase();
        match name.as_str() {
            "BOOLEAN" | "BOOL" => Self::Bool,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "FLOAT" | "DOUBLE" | "REAL" => Self::Float,
            n if n.contains("INT") && n.contains("UNSIGNED") => Self::UnsignedInt,
            n if n.contains("INT") => Self::Int,
            n if n.contains("BLOB") || n.contains("BINARY") => Self::Bytes,
            _ => Self::Text,
        }
    }
}

/// An unsigned column value as a [`Value`]: `Int` while it fits, otherwise
/// its decimal text.
pub(crate) fn unsigned_value(n: u64) -> Value {
    i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Int)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_types_are_classified() {
        assert_eq!(ColumnClass::of("BIGINT"), ColumnClass::Int);
        assert_eq!(ColumnClass::of("INT UNSIGNED"), ColumnClass::UnsignedInt);
        assert_eq!(ColumnClass::of("bigint unsigned"), ColumnClass::UnsignedInt);
        assert_eq!(ColumnClass::of("integer"), ColumnClass::Int);
        assert_eq!(ColumnClass::of("BOOLEAN"), ColumnClass::Bool);
        assert_eq!(ColumnClass::of("DOUBLE"), ColumnClass::Float);
        assert_eq!(ColumnClass::of("REAL"), ColumnClass::Float);
        assert_eq!(ColumnClass::of("DATETIME"), ColumnClass::DateTime);
        assert_eq!(ColumnClass::of("MEDIUMBLOB"), ColumnClass::Bytes);
        assert_eq!(ColumnClass::of("VARCHAR"), ColumnClass::Text);
        assert_eq!(ColumnClass::of("DECIMAL"), ColumnClass::Text);
    }

    #[test]
    fn unsigned_values_above_i64_max_stay_exact() {
        assert_eq!(unsigned_value(42), Value::Int(42));
        assert_eq!(unsigned_value(i64::MAX as u64), Value::Int(i64::MAX));
        assert_eq!(
            unsigned_value(u64::MAX),
            Value::Text("18446744073709551615".into())
        );
    }
}
