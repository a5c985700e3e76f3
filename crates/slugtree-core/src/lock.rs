//! In-process exclusive locks on route subtrees.
//!
//! A lock covers a slug and everything below it within one scope. Two locks
//! conflict when their scopes match and one slug is equal to, or an ancestor
//! of, the other.

use std::sync::{
  Arc,
  atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

use crate::{Error, Result, route::Scope, slug};

struct Held {
  token: u64,
  scope: Scope,
  slug:  String,
}

/// Registry of subtrees currently being rewritten.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct SubtreeLocks {
  held: Arc<Mutex<Vec<Held>>>,
  next: Arc<AtomicU64>,
}

impl SubtreeLocks {
  pub fn new() -> Self { Self::default() }

  /// Lock all of `slugs` in `scope` at once, or none of them.
  ///
  /// Fails with [`Error::ConcurrentCascade`] if any requested subtree
  /// overlaps one that is already held.
  pub fn try_lock(&self, scope: &Scope, slugs: &[&str]) -> Result<SubtreeGuard> {
    let mut held = self.held.lock();

    for wanted in slugs {
      if let Some(busy) = held
        .iter()
        .find(|h| h.scope == *scope && slug::overlaps(&h.slug, wanted))
      {
        return Err(Error::ConcurrentCascade { slug: busy.slug.clone() });
      }
    }

    let token = self.next.fetch_add(1, Ordering::Relaxed);
    held.extend(slugs.iter().map(|s| Held {
      token,
      scope: scope.clone(),
      slug: (*s).to_owned(),
    }));

    Ok(SubtreeGuard { locks: self.clone(), token })
  }

  /// Number of subtrees currently locked.
  pub fn held(&self) -> usize { self.held.lock().len() }
}

/// Releases its subtrees when dropped.
#[must_use = "the subtree is unlocked as soon as the guard is dropped"]
pub struct SubtreeGuard {
  locks: SubtreeLocks,
  token: u64,
}

impl Drop for SubtreeGuard {
  fn drop(&mut self) {
    self.locks.held.lock().retain(|h| h.token != self.token);
  }
}
