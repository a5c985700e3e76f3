//! Error type for `slugtree-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A constraint of the route model, e.g. a duplicate slug in a batch.
  #[error(transparent)]
  Core(#[from] slugtree_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl From<Error> for slugtree_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      other => slugtree_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
