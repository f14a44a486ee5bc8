//! `orm` crate — records bound to registered schemas.
//!
//! [`Record`] runs the finders (`find`, `find_all`, `find_number`) and the
//! instance writes (`save`, `update`, `remove`) through a [`db::Executor`].
//! [`Model`] layers typed structs on top.

pub mod error;
pub mod model;
pub mod query;
pub mod record;


pub use error::OrmError;
pub use model::Model;
pub use query::{FindAll, Limit};
pub use record::{Record, RecordState};
