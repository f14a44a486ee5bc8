//! Typed error types for the db crate.

use thiserror::Error;

/// Failure reported by a backend while connecting or running a statement.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The connection to the server is gone; the connection is unusable.
    #[error("{0}")]
    Disconnected(String),

    /// Failure raised by a non-sqlx backend (the mock backend, for one).
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Whether the connection that reported this error must not be reused.
    /// Statement-level failures (syntax, constraints) leave it usable.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::WorkerCrashed
            ),
            Self::Disconnected(_) => true,
            Self::Other(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// Required pool settings are missing or inconsistent.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The pool's initial connections could not be opened.
    #[error("failed to create connection pool: {0}")]
    PoolInit(#[source] DriverError),

    /// Acquisition attempted on a draining or closed pool.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Opening an additional connection on demand failed.
    #[error("failed to open connection: {0}")]
    Connect(#[source] DriverError),

    /// A statement failed at the driver.
    #[error("query failed: {source} (sql: {sql})")]
    Query {
        sql: String,
        #[source]
        source: DriverError,
    },
}

impl DbError {
    /// Whether this error means the pool could not be created at all.
    pub fn is_pool_init(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::PoolInit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_disconnect_errors_lose_the_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(DriverError::Sqlx(sqlx::Error::Io(io)).is_connection_lost());
        assert!(DriverError::Disconnected("gone".into()).is_connection_lost());

        assert!(!DriverError::Sqlx(sqlx::Error::RowNotFound).is_connection_lost());
        assert!(!DriverError::Other("syntax error".into()).is_connection_lost());
    }
}
