//! `Record` — a schema-bound bag of values with finder and write operations.
//!
//! A record only ever holds fields its schema declares. Reads never fail for
//! unset fields; writes resolve declared defaults lazily, once, and keep the
//! resolved value.

use std::sync::Arc;

use db::Executor;
use indexmap::IndexMap;
use schema::{Row, Schema, Value};
use tracing::{debug, warn};

use crate::query::{find_by_pk_sql, find_number_sql};
use crate::{FindAll, OrmError};

/// Where a record stands relative to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Built in memory, never written.
    Transient,
    /// Saved, or loaded from a row.
    Persisted,
    Removed,
}

#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: IndexMap<String, Value>,
    state: RecordState,
}

impl Record {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: IndexMap::new(),
            state: RecordState::Transient,
        }
    }

    /// Materialize a row returned by the schema's select. Columns are mapped
    /// back to field names and coerced to the declared kinds; unmapped
    /// columns are kept under their column name.
    pub fn from_row(schema: Arc<Schema>, row: Row) -> Self {
        let mut values = IndexMap::with_capacity(row.len());
        for (column, value) in row {
            match schema.field_for_column(&column) {
                Some(name) => {
                    let kind = schema.mappings()[name].kind();
                    values.insert(name.to_owned(), kind.coerce(value));
                }
                None => {
                    values.insert(column, value);
                }
            }
        }
        Self {
            schema,
            values,
            state: RecordState::Persisted,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Every value set so far, in the order it was set.
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    fn check_field(&self, field: &str) -> Result<(), OrmError> {
        if self.schema.field(field).is_some() {
            Ok(())
        } else {
            Err(OrmError::UnknownField {
                schema: self.schema.name().to_owned(),
                field: field.to_owned(),
            })
        }
    }

    /// # Errors
    /// [`OrmError::UnknownField`] if the schema doesn't declare `field`.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), OrmError> {
        self.check_field(field)?;
        self.values.insert(field.to_owned(), value.into());
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Result<Self, OrmError> {
        self.set(field, value)?;
        Ok(self)
    }

    /// The value currently held, if any. Defaults are not consulted.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// The value currently held; if it is unset or null, the field's default,
    /// which is then stored. Fields without a default read as null.
    ///
    /// # Errors
    /// [`OrmError::UnknownField`] if the schema doesn't declare `field`.
    pub fn value_or_default(&mut self, field: &str) -> Result<Value, OrmError> {
        if let Some(value) = self.values.get(field).filter(|v| !v.is_null()) {
            return Ok(value.clone());
        }
        self.check_field(field)?;

        let default = self.schema.mappings()[field]
            .default_value()
            .map(|d| d.resolve());
        match default {
            Some(value) => {
                debug!("using default value for {}: {}", field, value);
                self.values.insert(field.to_owned(), value.clone());
                Ok(value)
            }
            None => Ok(Value::Null),
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.value(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.value(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.value(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.value(field).and_then(Value::as_bool)
    }

    fn current(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or(Value::Null)
    }

    // -----------------------------------------------------------------------
    // Finders
    // -----------------------------------------------------------------------

    /// Every row matching `query`, as records.
    ///
    /// # Errors
    /// Any [`DbError`](db::DbError) from the executor.
    pub async fn find_all(
        db: &Executor,
        schema: &Arc<Schema>,
        query: &FindAll,
    ) -> Result<Vec<Record>, OrmError> {
        let (sql, args) = query.to_sql(schema);
        let rows = db.run_query(&sql, &args, None).await?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(schema.clone(), row))
            .collect())
    }

    /// A single aggregate, e.g. `count(id)`; `None` when no row comes back.
    ///
    /// # Errors
    /// Any [`DbError`](db::DbError) from the executor.
    pub async fn find_number(
        db: &Executor,
        schema: &Schema,
        select_expr: &str,
        filter: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, OrmError> {
        let sql = find_number_sql(schema, select_expr, filter);
        let rows = db.run_query(&sql, args, Some(1)).await?;
        Ok(rows.into_iter().next().and_then(|mut row| row.swap_remove("_num_")))
    }

    /// The record whose primary key is `pk`.
    ///
    /// # Errors
    /// Any [`DbError`](db::DbError) from the executor.
    pub async fn find(
        db: &Executor,
        schema: &Arc<Schema>,
        pk: impl Into<Value>,
    ) -> Result<Option<Record>, OrmError> {
        let sql = find_by_pk_sql(schema);
        let rows = db.run_query(&sql, &[pk.into()], Some(1)).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| Record::from_row(schema.clone(), row)))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert this record, filling unset fields from their defaults.
    /// Returns the affected-row count; anything but 1 is logged as a warning.
    ///
    /// # Errors
    /// Any [`DbError`](db::DbError) from the executor.
    pub async fn save(&mut self, db: &Executor) -> Result<u64, OrmError> {
        let schema = self.schema.clone();
        let mut args = Vec::with_capacity(schema.fields().len() + 1);
        for field in schema.fields() {
            args.push(self.value_or_default(field)?);
        }
        args.push(self.value_or_default(schema.primary_key())?);

        let rows = db.run_mutation(&schema.sql().insert, &args).await?;
        if rows != 1 {
            warn!("failed to insert record: affected rows: {}", rows);
        }
        self.state = RecordState::Persisted;
        Ok(rows)
    }

    /// Write the current values back by primary key. Defaults are not
    /// applied; unset fields are written as null. A schema with no field
    /// besides its primary key has nothing to write, so no statement is run.
    ///
    /// # Errors
    /// Any [`DbError`](db::DbError) from the executor.
    pub async fn update(&mut self, db: &Executor) -> Result<u64, OrmError> {
        let schema = self.schema.clone();
        if schema.fields().is_empty() {
            warn!("nothing to update: {} has no fields besides its primary key", schema.name());
            return Ok(0);
        }
        let mut args: Vec<Value> = schema.fields().iter().map(|f| self.current(f)).collect();
        args.push(self.current(schema.primary_key()));

        let rows = db.run_mutation(&schema.sql().update, &args).await?;
        if rows != 1 {
            warn!("failed to update record: affected rows: {}", rows);
        }
        Ok(rows)
    }

    /// Delete this record's row by primary key.
    ///
    /// # Errors
    /// Any [`DbError`](db::DbError) from the executor.
    pub async fn remove(&mut self, db: &Executor) -> Result<u64, OrmError> {
        let args = [self.current(self.schema.primary_key())];

        let rows = db.run_mutation(&self.schema.sql().delete, &args).await?;
        if rows != 1 {
            warn!("failed to delete record: affected rows: {}", rows);
        }
        self.state = RecordState::Removed;
        Ok(rows)
    }
}
