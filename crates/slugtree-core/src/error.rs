//! Error types for `slugtree-core`.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  /// A live route already holds this slug in the same scope.
  #[error("slug {slug:?} is already taken in locale {locale:?}")]
  DuplicateSlug { slug: String, locale: String, site: Option<String> },

  /// The resource already owns a live route in this scope.
  #[error("resource {resource_key}:{resource_id} already has a route in locale {locale:?}")]
  DuplicateRoute {
    resource_key: String,
    resource_id:  String,
    locale:       String,
  },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("invalid slug {slug:?}: {reason}")]
  InvalidSlug { slug: String, reason: &'static str },

  /// A storage error interrupted a cascade. Batches counted in `flushed`
  /// are committed; re-running the cascade finishes the rest.
  #[error("cascade aborted after {flushed} flushed descendants: {source}")]
  CascadeAborted {
    flushed: usize,
    #[source]
    source:  BoxError,
  },

  #[error("cascade timed out after {after:?} ({flushed} descendants flushed)")]
  CascadeTimeout { flushed: usize, after: Duration },

  /// Another cascade holds a lock on an overlapping subtree.
  #[error("another cascade is running on an overlapping subtree of {slug:?}")]
  ConcurrentCascade { slug: String },

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl Error {
  pub(crate) fn invalid(slug: &str, reason: &'static str) -> Self {
    Self::InvalidSlug { slug: slug.to_owned(), reason }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
