//! SQLite backend for the Parley engagement store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The races the pipeline cares about are
//! closed by uniqueness constraints in [`schema`], with conflicts resolved as
//! fetches inside a single connection call.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
