//! MySQL backend on top of `sqlx`.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use schema::{Row, Value};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, MySql, Row as _, TypeInfo, ValueRef};
use tracing::info;

use crate::connection::{unsigned_value, ColumnClass};
use crate::{Connection, Connector, DbError, DriverError, ParamStyle, Pool, PoolConfig};

/// Opens MySQL connections from a validated [`PoolConfig`].
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    options: MySqlConnectOptions,
    autocommit: bool,
}

impl MySqlConnector {
    /// # Errors
    /// [`DbError::InvalidConfig`] if a required setting is missing.
    pub fn new(config: &PoolConfig) -> Result<Self, DbError> {
        let credentials = config.validate()?;
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(credentials.user)
            .password(credentials.password)
            .database(credentials.database)
            .charset(&config.charset);
        Ok(Self {
            options,
            autocommit: config.autocommit,
        })
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, DriverError> {
        let mut conn = self.options.connect().await?;
        let autocommit = if self.autocommit {
            "SET autocommit=1"
        } else {
            "SET autocommit=0"
        };
        sqlx::query(autocommit).execute(&mut conn).await?;
        Ok(Box::new(MySqlConn { conn }))
    }
}

/// Create a MySQL-backed pool from `config`.
///
/// # Errors
/// [`DbError::InvalidConfig`] or [`DbError::PoolInit`]; see [`Pool::create`].
pub async fn create_pool(config: &PoolConfig) -> Result<Pool, DbError> {
    info!(
        "Connecting to MySQL at {}:{} (max_connections={})",
        config.host, config.port, config.max_size
    );
    let connector = MySqlConnector::new(config)?;
    Pool::create(config, connector).await
}

struct MySqlConn {
    conn: sqlx::MySqlConnection,
}

#[async_trait]
impl Connection for MySqlConn {
    async fn fetch(
        &mut self,
        sql: &str,
        args: &[Value],
        limit: Option<usize>,
    ) -> Result<Vec<Row>, DriverError> {
        let query = bind_all(sql, args);
        let rows: Vec<MySqlRow> = match limit {
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

fn bind_all<'q>(sql: &'q str, args: &[Value]) -> Query<'q, MySql, MySqlArguments> {
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

fn decode_row(row: &MySqlRow) -> Result<Row, DriverError> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_owned(), decode_value(row, idx)?);
    }
    Ok(out)
}

fn decode_value(row: &MySqlRow, idx: usize) -> Result<Value, DriverError> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let class = ColumnClass::of(raw.type_info().name());

    let value = match class {
        ColumnClass::Bool => Value::Bool(row.try_get_unchecked::<bool, _>(idx)?),
        ColumnClass::Int => Value::Int(row.try_get_unchecked::<i64, _>(idx)?),
        ColumnClass::UnsignedInt => unsigned_value(row.try_get_unchecked::<u64, _>(idx)?),
        ColumnClass::Float => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
        ColumnClass::DateTime => {
            let ts = row.try_get_unchecked::<chrono::NaiveDateTime, _>(idx)?;
            Value::Text(ts.to_string())
        }
        ColumnClass::Date => {
            Value::Text(row.try_get_unchecked::<chrono::NaiveDate, _>(idx)?.to_string())
        }
        ColumnClass::Time => {
            Value::Text(row.try_get_unchecked::<chrono::NaiveTime, _>(idx)?.to_string())
        }
        ColumnClass::Bytes => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        ColumnClass::Text => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}
