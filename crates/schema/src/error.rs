//! Typed error type for schema declaration and registration.

use thiserror::Error;

/// Errors raised while turning a declaration into a [`Schema`](crate::Schema).
///
/// All of them are fatal for the declaration: no templates are produced.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A second primary-key descriptor was found.
    #[error("duplicate primary key for field: {field} (schema '{schema}')")]
    DuplicatePrimaryKey { schema: String, field: String },

    /// No descriptor was flagged as primary key.
    #[error("primary key not found (schema '{schema}')")]
    PrimaryKeyNotFound { schema: String },

    /// A schema of the same name was already registered with different SQL.
    #[error("schema '{0}' is already registered with a different declaration")]
    Conflict(String),

    /// A declaration file names a default producer that doesn't exist.
    #[error("unknown default producer '{producer}' for field '{field}'")]
    UnknownProducer { field: String, producer: String },

    /// A declaration file could not be parsed.
    #[error("invalid schema declaration: {0}")]
    Parse(#[from] toml::de::Error),
}
