//! `Model` — typed structs on top of [`Record`].
//!
//! Implementors describe their schema once and convert to and from a
//! [`Record`]; the finders and writes come for free.

use std::sync::Arc;

use async_trait::async_trait;
use db::Executor;
use schema::{Schema, Value};

use crate::{FindAll, OrmError, Record};

#[async_trait]
pub trait Model: Sized + Send + Sync {
    /// The registered schema. Implementations typically register it once
    /// behind a `OnceLock` or keep it in a [`Registry`](schema::Registry).
    fn schema() -> Arc<Schema>;

    fn to_record(&self) -> Result<Record, OrmError>;

    fn from_record(record: &Record) -> Result<Self, OrmError>;

    async fn find(db: &Executor, pk: Value) -> Result<Option<Self>, OrmError> {
        match Record::find(db, &Self::schema(), pk).await? {
            Some(record) => Self::from_record(&record).map(Some),
            None => Ok(None),
        }
    }

    async fn find_all(db: &Executor, query: &FindAll) -> Result<Vec<Self>, OrmError> {
        Record::find_all(db, &Self::schema(), query)
            .await?
            .iter()
            .map(Self::from_record)
            .collect()
    }

    async fn find_number(
        db: &Executor,
        select_expr: &str,
        filter: Option<&str>,
        args: &[Value],
    ) -> Result<Option<Value>, OrmError> {
        Record::find_number(db, &Self::schema(), select_expr, filter, args).await
    }

    /// Insert, then reload `self` so resolved defaults become visible.
    async fn save(&mut self, db: &Executor) -> Result<u64, OrmError> {
        let mut record = self.to_record()?;
        let rows = record.save(db).await?;
        *self = Self::from_record(&record)?;
        Ok(rows)
    }

    async fn update(&self, db: &Executor) -> Result<u64, OrmError> {
        self.to_record()?.update(db).await
    }

    async fn remove(&self, db: &Executor) -> Result<u64, OrmError> {
        self.to_record()?.remove(db).await
    }
}
