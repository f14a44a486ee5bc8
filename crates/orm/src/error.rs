//! Typed error types for the orm crate.

use db::DbError;
use schema::SchemaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// A `limit` that is neither a count nor an `(offset, count)` pair.
    #[error("invalid limit value: {0}")]
    InvalidLimit(String),

    #[error("schema '{schema}' has no field '{field}'")]
    UnknownField { schema: String, field: String },
}
