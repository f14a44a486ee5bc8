//! Field descriptors — the declarative description of one mapped column.
//!
//! A descriptor only stores what it was given. Defaults are resolved lazily
//! by the record layer, never when the schema is declared.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Value;

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// The column families a descriptor can map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Float,
    Text,
}

impl FieldKind {
    /// The fixed SQL type of this kind.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::String => "varchar(100)",
            Self::Integer => "bigint",
            Self::Boolean => "boolean",
            Self::Float => "real",
            Self::Text => "text",
        }
    }

    /// Default applied when a descriptor of this kind is declared without one.
    fn implicit_default(self) -> Option<Value> {
        match self {
            Self::Integer => Some(Value::Int(0)),
            Self::Float => Some(Value::Float(0.0)),
            Self::Boolean => Some(Value::Bool(false)),
            Self::String | Self::Text => None,
        }
    }

    /// Normalise a value returned by a driver to this kind.
    ///
    /// Drivers report `boolean` columns as small integers and may hand back
    /// whole floats as integers; both are folded back here. Values that don't
    /// fit are returned untouched.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (Self::Boolean, Value::Int(i)) => Value::Bool(i != 0),
            (Self::Float, Value::Int(i)) => Value::Float(i as f64),
            (_, value) => value,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "StringField",
            Self::Integer => "IntegerField",
            Self::Boolean => "BooleanField",
            Self::Float => "FloatField",
            Self::Text => "TextField",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Default values
// ---------------------------------------------------------------------------

/// A field default: either a fixed value or a zero-argument producer.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Value),
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produce the value. Producers run on every call; callers that must
    /// resolve at most once store the result.
    pub fn resolve(&self) -> Value {
        match self {
            Self::Static(v) => v.clone(),
            Self::Producer(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Descriptor for one column of a schema.
#[derive(Debug, Clone)]
pub struct Field {
    column: Option<String>,
    kind: FieldKind,
    sql_type: String,
    primary_key: bool,
    default: Option<DefaultValue>,
}

impl Field {
    fn of(kind: FieldKind) -> Self {
        Self {
            column: None,
            kind,
            sql_type: kind.sql_type().to_owned(),
            primary_key: false,
            default: kind.implicit_default().map(DefaultValue::Static),
        }
    }

    /// `varchar(100)` column, no default.
    pub fn string() -> Self {
        Self::of(FieldKind::String)
    }

    /// `bigint` column, default `0`.
    pub fn integer() -> Self {
        Self::of(FieldKind::Integer)
    }

    /// `boolean` column, default `false`.
    pub fn boolean() -> Self {
        Self::of(FieldKind::Boolean)
    }

    /// `real` column, default `0.0`.
    pub fn float() -> Self {
        Self::of(FieldKind::Float)
    }

    /// `text` column, no default.
    pub fn text() -> Self {
        Self::of(FieldKind::Text)
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Map the field onto a column with a different name.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    /// Override the column DDL, e.g. `varchar(50)` for a short string key.
    pub fn ddl(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = sql_type.into();
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    /// Dynamic default, evaluated only when the field is read while unset.
    pub fn default_with<F>(mut self, producer: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(producer)));
        self
    }

    pub fn no_default(mut self) -> Self {
        self.default = None;
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Explicit column override, if any.
    pub fn column_name(&self) -> Option<&str> {
        self.column.as_deref()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}, {}, {}>",
            self.kind,
            self.sql_type,
            self.column.as_deref().unwrap_or("-")
        )
    }
}
