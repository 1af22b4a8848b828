//! SQL access layer for the TurboCommerce product index.
//!
//! The index workers talk to a relational store through the [`Connection`]
//! trait, so the same structure-sync and upsert code runs against a live
//! driver, a recorded fake in tests, or a [`SnapshotConnection`] that plans
//! DDL against a JSON dump of an existing schema.
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_db::{Db, params};
//!
//! let db = Db::new(my_connection);
//!
//! db.execute(
//!     "UPDATE productindex_store SET crc_index = crc_current WHERE id = ? AND tenant = ?",
//!     params![42, "default"],
//! )?;
//!
//! let data: Option<String> = db.fetch_one_value(
//!     "SELECT data FROM productindex_store WHERE id = ? AND tenant = ?",
//!     params![42, "default"],
//! )?;
//! ```

mod db;
mod error;
mod snapshot;
mod types;

pub use db::{Connection, Db};
pub use error::DbError;
pub use snapshot::{ColumnSnapshot, SchemaSnapshot, SnapshotConnection, TableSnapshot};
pub use types::{normalize_column_type, QueryResult, Row, Value};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{params, Connection, Db, DbError, QueryResult, Row, Value};
}

/// Create a parameter list for SQL queries.
///
/// ```rust,ignore
/// use turbo_db::params;
///
/// let params = params![42, "default", true];
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[]
    };
    ($($param:expr),+ $(,)?) => {
        &[$($crate::Value::from($param)),+]
    };
}
