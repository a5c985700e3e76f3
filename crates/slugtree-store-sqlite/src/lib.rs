//! SQLite backend for the slug tree.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every batch handed to
//! [`RouteStore::commit`](slugtree_core::store::RouteStore::commit) runs in a
//! single transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
