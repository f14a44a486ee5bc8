//! Schema registration — run once per declared schema.
//!
//! Rules enforced:
//! 1. Exactly one descriptor is flagged as primary key.
//! 2. Non-key fields keep their declaration order; that order is the
//!    argument order of every insert and update.
//!
//! The four canned statements are rendered here and never again. They use the
//! neutral `?` placeholder; the executor rewrites it for the backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::{Field, SchemaError};

// ---------------------------------------------------------------------------
// Declaration
// ---------------------------------------------------------------------------

/// An unregistered schema: a name, an optional table override and the field
/// descriptors in declaration order.
#[derive(Debug, Clone)]
pub struct SchemaDecl {
    name: String,
    table: Option<String>,
    fields: IndexMap<String, Field>,
}

impl SchemaDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: IndexMap::new(),
        }
    }

    /// Use `table` instead of the schema name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Declare a field. Re-declaring a name replaces the earlier descriptor
    /// in place.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Shorthand for [`register`].
    pub fn register(self) -> Result<Schema, SchemaError> {
        register(self)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// The four statements every schema gets at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplates {
    pub select: String,
    pub insert: String,
    pub update: String,
    pub delete: String,
}

/// A registered, immutable schema.
#[derive(Debug)]
pub struct Schema {
    name: String,
    table: String,
    mappings: IndexMap<String, Field>,
    primary_key: String,
    fields: Vec<String>,
    sql: SqlTemplates,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the primary-key field.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Non-key field names in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// All descriptors, primary key included.
    pub fn mappings(&self) -> &IndexMap<String, Field> {
        &self.mappings
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.mappings.get(name)
    }

    pub fn sql(&self) -> &SqlTemplates {
        &self.sql
    }

    /// Column backing `field`: the descriptor's override, else the field name.
    pub fn column_of<'a>(&'a self, field: &'a str) -> &'a str {
        self.mappings
            .get(field)
            .and_then(Field::column_name)
            .unwrap_or(field)
    }

    /// Field mapped onto `column`, if any.
    pub fn field_for_column(&self, column: &str) -> Option<&str> {
        self.mappings
            .keys()
            .find(|name| self.column_of(name) == column)
            .map(String::as_str)
    }

    /// `create table` statement built from the descriptors' SQL types.
    pub fn create_table_sql(&self) -> String {
        let pk_field = &self.mappings[&self.primary_key];
        let mut columns = vec![format!(
            "{} {} not null",
            quote(self.column_of(&self.primary_key)),
            pk_field.sql_type()
        )];
        for name in &self.fields {
            let field = &self.mappings[name];
            columns.push(format!("{} {}", quote(self.column_of(name)), field.sql_type()));
        }
        columns.push(format!("primary key ({})", quote(self.column_of(&self.primary_key))));
        format!("create table {} ({})", quote(&self.table), columns.join(", "))
    }
}

fn quote(ident: &str) -> String {
    format!("`{ident}`")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

// ---------------------------------------------------------------------------
// register
// ---------------------------------------------------------------------------

/// Validate a declaration and render its SQL templates.
///
/// # Errors
/// - [`SchemaError::DuplicatePrimaryKey`] if two descriptors are primary keys.
/// - [`SchemaError::PrimaryKeyNotFound`] if none is.
pub fn register(decl: SchemaDecl) -> Result<Schema, SchemaError> {
    let SchemaDecl { name, table, fields: mappings } = decl;
    let table = table.unwrap_or_else(|| name.clone());
    info!("found model: {} (table: {})", name, table);

    let mut primary_key: Option<String> = None;
    let mut fields = Vec::with_capacity(mappings.len());

    for (field_name, field) in &mappings {
        debug!("  found mapping: {} ==> {}", field_name, field);
        if field.is_primary_key() {
            if primary_key.is_some() {
                return Err(SchemaError::DuplicatePrimaryKey {
                    schema: name,
                    field: field_name.clone(),
                });
            }
            primary_key = Some(field_name.clone());
        } else {
            fields.push(field_name.clone());
        }
    }

    let primary_key = primary_key.ok_or_else(|| SchemaError::PrimaryKeyNotFound {
        schema: name.clone(),
    })?;

    let column = |f: &str| -> String {
        let col = mappings.get(f).and_then(Field::column_name).unwrap_or(f);
        quote(col)
    };

    let pk = column(primary_key.as_str());
    let escaped: Vec<String> = fields.iter().map(|f| column(f.as_str())).collect();
    let quoted_table = quote(&table);

    let select = if escaped.is_empty() {
        format!("select {pk} from {quoted_table}")
    } else {
        format!("select {pk}, {} from {quoted_table}", escaped.join(","))
    };

    let mut insert_columns = escaped.clone();
    insert_columns.push(pk.clone());
    let insert = format!(
        "insert into {quoted_table} ({}) values ({})",
        insert_columns.join(","),
        placeholders(escaped.len() + 1)
    );

    let assignments: Vec<String> = escaped.iter().map(|c| format!("{c}=?")).collect();
    let update = format!(
        "update {quoted_table} set {} where {pk}=?",
        assignments.join(",")
    );

    let delete = format!("delete from {quoted_table} where {pk}=?");

    Ok(Schema {
        name,
        table,
        mappings,
        primary_key,
        fields,
        sql: SqlTemplates { select, insert, update, delete },
    })
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered schemas by name so each is registered exactly once.
#[derive(Debug, Default)]
pub struct Registry {
    schemas: Mutex<HashMap<String, Arc<Schema>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decl`, or return the schema already registered under its
    /// name.
    ///
    /// # Errors
    /// Any [`register`] error, or [`SchemaError::Conflict`] when the stored
    /// schema's table or templates differ from what `decl` would produce.
    pub fn register(&self, decl: SchemaDecl) -> Result<Arc<Schema>, SchemaError> {
        let candidate = register(decl)?;
        let mut schemas = self.schemas.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = schemas.get(candidate.name()) {
            if existing.table == candidate.table && existing.sql == candidate.sql {
                debug!("schema '{}' already registered", candidate.name);
                return Ok(existing.clone());
            }
            return Err(SchemaError::Conflict(candidate.name));
        }

        let schema = Arc::new(candidate);
        schemas.insert(schema.name.clone(), schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> SchemaDecl {
        SchemaDecl::new("User")
            .table("users")
            .field("id", Field::integer().primary_key())
            .field("name", Field::string())
            .field("email", Field::string())
    }

    #[test]
    fn users_templates_match_expected_sql() {
        let schema = users().register().expect("should register");
        let sql = schema.sql();
        assert_eq!(sql.select, "select `id`, `name`,`email` from `users`");
        assert_eq!(
            sql.insert,
            "insert into `users` (`name`,`email`,`id`) values (?,?,?)"
        );
        assert_eq!(sql.update, "update `users` set `name`=?,`email`=? where `id`=?");
        assert_eq!(sql.delete, "delete from `users` where `id`=?");
        assert_eq!(schema.fields(), ["name", "email"]);
        assert_eq!(schema.primary_key(), "id");
    }

    #[test]
    fn insert_has_one_placeholder_per_field() {
        for extra in 0..5 {
            let mut decl = SchemaDecl::new("T").field("pk", Field::string().primary_key());
            for i in 0..extra {
                decl = decl.field(format!("f{i}"), Field::integer());
            }
            let schema = decl.register().expect("should register");
            assert_eq!(schema.sql().insert.matches('?').count(), extra + 1);
            assert_eq!(schema.sql().update.matches('?').count(), extra + 1);
        }
    }

    #[test]
    fn table_defaults_to_schema_name() {
        let schema = SchemaDecl::new("Blog")
            .field("id", Field::string().primary_key())
            .register()
            .unwrap();
        assert_eq!(schema.table(), "Blog");
        assert_eq!(schema.sql().select, "select `id` from `Blog`");
    }

    #[test]
    fn missing_primary_key_is_rejected() {
        let result = SchemaDecl::new("NoKey").field("name", Field::string()).register();
        assert!(matches!(
            result,
            Err(SchemaError::PrimaryKeyNotFound { schema }) if schema == "NoKey"
        ));
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let result = SchemaDecl::new("TwoKeys")
            .field("a", Field::integer().primary_key())
            .field("b", Field::string().primary_key())
            .register();
        assert!(matches!(
            result,
            Err(SchemaError::DuplicatePrimaryKey { field, .. }) if field == "b"
        ));
    }

    #[test]
    fn column_override_is_used_by_every_template() {
        let schema = SchemaDecl::new("Comment")
            .table("comments")
            .field("id", Field::string().primary_key())
            .field("body", Field::text().column("content"))
            .register()
            .unwrap();
        let sql = schema.sql();
        assert_eq!(sql.select, "select `id`, `content` from `comments`");
        assert_eq!(sql.insert, "insert into `comments` (`content`,`id`) values (?,?)");
        assert_eq!(sql.update, "update `comments` set `content`=? where `id`=?");
        assert_eq!(schema.field_for_column("content"), Some("body"));
        assert_eq!(schema.column_of("body"), "content");
    }

    #[test]
    fn create_table_uses_descriptor_types() {
        let schema = users().register().unwrap();
        assert_eq!(
            schema.create_table_sql(),
            "create table `users` (`id` bigint not null, `name` varchar(100), \
             `email` varchar(100), primary key (`id`))"
        );
    }

    #[test]
    fn registry_registers_once() {
        let registry = Registry::new();
        let first = registry.register(users()).unwrap();
        let second = registry.register(users()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let divergent = SchemaDecl::new("User")
            .table("users")
            .field("id", Field::integer().primary_key())
            .field("email", Field::string());
        assert!(matches!(
            registry.register(divergent),
            Err(SchemaError::Conflict(name)) if name == "User"
        ));
        assert!(Arc::ptr_eq(&registry.get("User").unwrap(), &first));
    }
}
