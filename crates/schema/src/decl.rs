//! Schema declarations read from TOML files.
//!
//! ```toml
//! name = "User"
//! table = "users"
//!
//! [[fields]]
//! name = "id"
//! kind = "string"
//! primary_key = true
//! ddl = "varchar(50)"
//! producer = "next_id"
//!
//! [[fields]]
//! name = "admin"
//! kind = "boolean"
//! ```

use serde::Deserialize;

use crate::{defaults, Field, FieldKind, SchemaDecl, SchemaError, Value};

/// Top-level shape of a declaration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<FieldSpec>,
}

/// One `[[fields]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub ddl: Option<String>,
    /// Static default; takes precedence over the kind's implicit default.
    #[serde(default)]
    pub default: Option<Value>,
    /// Name of a producer from [`defaults::by_name`].
    #[serde(default)]
    pub producer: Option<String>,
}

impl SchemaFile {
    pub fn parse(source: &str) -> Result<Self, SchemaError> {
        Ok(toml::from_str(source)?)
    }

    /// Turn the file into a declaration ready for registration.
    pub fn into_decl(self) -> Result<SchemaDecl, SchemaError> {
        let mut decl = SchemaDecl::new(self.name);
        if let Some(table) = self.table {
            decl = decl.table(table);
        }
        for spec in self.fields {
            let field = spec.to_field()?;
            decl = decl.field(spec.name, field);
        }
        Ok(decl)
    }
}

impl FieldSpec {
    fn to_field(&self) -> Result<Field, SchemaError> {
        let mut field = match self.kind {
            FieldKind::String => Field::string(),
            FieldKind::Integer => Field::integer(),
            FieldKind::Boolean => Field::boolean(),
            FieldKind::Float => Field::float(),
            FieldKind::Text => Field::text(),
        };
        if self.primary_key {
            field = field.primary_key();
        }
        if let Some(column) = &self.column {
            field = field.column(column.clone());
        }
        if let Some(ddl) = &self.ddl {
            field = field.ddl(ddl.clone());
        }
        if let Some(value) = &self.default {
            field = field.default(value.clone());
        }
        if let Some(name) = &self.producer {
            let producer = defaults::by_name(name).ok_or_else(|| SchemaError::UnknownProducer {
                field: self.name.clone(),
                producer: name.clone(),
            })?;
            field = field.default_with(producer);
        }
        Ok(field)
    }
}
