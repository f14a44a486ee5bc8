//! SQLite backend on top of `sqlx`, used for local files and in-memory
//! databases.
//!
//! Every in-memory connection opens its own empty database, so a pool over
//! `sqlite::memory:` should be sized `min_size = max_size = 1`.

use std::str::FromStr;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use schema::{Row, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::connection::ColumnClass;
use crate::{Connection, Connector, DbError, DriverError, ParamStyle, Pool, PoolConfig};

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    options: SqliteConnectOptions,
}

impl SqliteConnector {
    /// Connector for a `sqlite:` URL; the file is created if missing.
    ///
    /// # Errors
    /// [`DbError::InvalidConfig`] if `url` cannot be parsed.
    pub fn new(url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbError::InvalidConfig(format!("bad sqlite url '{url}': {e}")))?
            .create_if_missing(true);
        Ok(Self { options })
    }

    pub fn in_memory() -> Self {
        Self {
            options: SqliteConnectOptions::new().in_memory(true),
        }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, DriverError> {
        let conn = self.options.connect().await?;
        Ok(Box::new(SqliteConn { conn }))
    }
}

/// Single-connection pool over a private in-memory database.
///
/// # Errors
/// [`DbError::PoolInit`] if SQLite cannot be opened.
pub async fn memory_pool() -> Result<Pool, DbError> {
    let config = PoolConfig::new("sqlite", "", ":memory:").with_size(1, 1);
    Pool::create(&config, SqliteConnector::in_memory()).await
}

struct SqliteConn {
    conn: sqlx::SqliteConnection,
}

#[async_trait]
impl Connection for SqliteConn {
    async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DriverError> {
        let query = bind_all(sql, args);
        let rows: Vec<SqliteRow> = match limit {
            Some(n) => query.fetch(&mut self.conn).take(n).try_collect().await?,
            None => query.fetch_all(&mut self.conn).await?,
        };
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, DriverError> {
        let done = bind_all(sql, args).execute(&mut self.conn).await?;
        Ok(done.rows_affected())
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        sqlx::Connection::close(self.conn).await?;
        Ok(())
    }
}

fn bind_all<'q>(sql: &'q str, args: &[Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> Result<Row, DriverError> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_owned(), decode_value(row, idx)?);
    }
    Ok(out)
}

// SQLite reports the storage class of each value, so date and time columns
// arrive as TEXT and are read as strings.
fn decode_value(row: &SqliteRow, idx: usize) -> Result<Value, DriverError> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let class = ColumnClass::of(raw.type_info().name());

    let value = match class {
        ColumnClass::Bool => Value::Bool(row.try_get_unchecked::<bool, _>(idx)?),
        ColumnClass::Int | ColumnClass::UnsignedInt => {
            Value::Int(row.try_get_unchecked::<i64, _>(idx)?)
        }
        ColumnClass::Float => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
        ColumnClass::Bytes => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        ColumnClass::DateTime | ColumnClass::Date | ColumnClass::Time | ColumnClass::Text => {
            Value::Text(row.try_get_unchecked::<String, _>(idx)?)
        }
    };
    Ok(value)
}
