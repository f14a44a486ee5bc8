//! `db` crate — connections, pooling and statement execution.
//!
//! Backends plug in through the [`Connector`] / [`Connection`] traits; the
//! [`Pool`] bounds how many connections are open and the [`Executor`] runs
//! statements through it. Nothing here knows about schemas or records.

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod mock;
pub mod mysql;
pub mod pool;
pub mod sqlite;

pub use config::{Credentials, PoolConfig};
pub use connection::{Connection, Connector, ParamStyle};
pub use error::{DbError, DriverError};
pub use executor::{rewrite_placeholders, Executor};
pub use mysql::{create_pool, MySqlConnector};
pub use pool::{Pool, PoolState, PoolStatus, ScopedConnection};
pub use sqlite::SqliteConnector;
