//! Database module: row models and SQL repositories.
//!
//! - `model`: filters and view models passed to and returned by repositories.
//! - `repo`: SQL-only functions over the SQLite pool.
//!
//! The repository API is re-exported at `crate::db::*`.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{PendingRequest, RawFilters};
