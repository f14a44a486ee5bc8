//! `schema` crate — field descriptors and schema registration.
//!
//! Declares record schemas as typed field descriptors and compiles each one,
//! once, into an immutable [`Schema`] carrying its table name, column
//! mappings and canned select/insert/update/delete statements.
//! No I/O lives here.

pub mod decl;
pub mod defaults;
pub mod error;
pub mod field;
pub mod registry;
pub mod value;

pub use decl::SchemaFile;
pub use error::SchemaError;
pub use field::{DefaultValue, Field, FieldKind};
pub use registry::{register, Registry, Schema, SchemaDecl, SqlTemplates};
pub use value::{Row, Value};
