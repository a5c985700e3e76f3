//! The `RouteStore` trait.
//!
//! Implemented by storage backends ([`crate::memory::MemoryRouteStore`],
//! `slugtree-store-sqlite`). The cascade and the resolver depend on this
//! abstraction, never on a concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  route::{DescendantCursor, NewRoute, ResourceRef, Route, Scope, SlugLookup, SlugOccupant},
  slug,
};

/// Forward pointers followed before a history chain is considered broken.
pub const MAX_FORWARD_HOPS: usize = 16;

/// Abstraction over a route store backend.
///
/// Reads always observe committed state only. Writes come in two flavours:
/// [`add`](RouteStore::add) and the `remove*` methods commit immediately,
/// while bulk rewrites go through a [`Session`]: `save` stages a mutation
/// and `flush` commits everything staged so far as one batch.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait RouteStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Immediate writes ──────────────────────────────────────────────────

  /// Insert a new live route.
  ///
  /// Fails with [`DuplicateSlug`](crate::Error::DuplicateSlug) if a live
  /// route holds the slug in the same scope, and with
  /// [`DuplicateRoute`](crate::Error::DuplicateRoute) if the resource
  /// already has a live route there. A history route at the slug is
  /// reclaimed.
  fn add(&self, input: NewRoute) -> impl Future<Output = Result<Route, Self::Error>> + Send + '_;

  /// Delete a single route row.
  fn remove(&self, id: Uuid) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete every route of `resource` in all scopes, plus any history
  /// route redirecting to one of them. Returns the number of rows removed.
  fn remove_all_for_resource<'a>(
    &'a self,
    resource: &'a ResourceRef,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Commit `batch` atomically, applying each route as an
  /// insert-or-update keyed by id, in order. A history route occupying the
  /// slug of a live route in the batch is reclaimed. On error nothing from
  /// the batch is committed.
  ///
  /// Returns the number of rows written.
  fn commit(
    &self,
    batch: Vec<Route>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Open a [`Session`] that stages writes for [`commit`](RouteStore::commit).
  fn session(&self) -> Session<'_, Self>
  where
    Self: Sized,
  {
    Session::new(self)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<Route>, Self::Error>> + Send + '_;

  /// The live route of `resource` in `scope`.
  fn find_one_by<'a>(
    &'a self,
    resource: &'a ResourceRef,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<Option<Route>, Self::Error>> + Send + 'a;

  /// Exact slug lookup, following history forward pointers to the live
  /// target (at most [`MAX_FORWARD_HOPS`]).
  fn find_by_slug<'a>(
    &'a self,
    slug: &'a str,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<SlugLookup, Self::Error>> + Send + 'a;

  /// Live routes whose `parent_id` is `parent`.
  fn find_children(
    &self,
    parent: Uuid,
  ) -> impl Future<Output = Result<Vec<Route>, Self::Error>> + Send + '_;

  /// History routes redirecting to `target`.
  fn find_history(
    &self,
    target: Uuid,
  ) -> impl Future<Output = Result<Vec<Route>, Self::Error>> + Send + '_;

  /// One page of the live strict descendants of `root` in `scope`, ordered
  /// by `(depth, slug)` and starting after `after`.
  ///
  /// Backends answer this from a range scan over the slug prefix; the
  /// caller drives pagination with [`DescendantCursor`], so a subtree is
  /// never materialised as a whole.
  fn descendants_page<'a>(
    &'a self,
    root: &'a str,
    scope: &'a Scope,
    after: Option<&'a DescendantCursor>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Route>, Self::Error>> + Send + 'a;

  /// Every route (live or history) in `scope` whose slug is `stem` or
  /// `stem-<n>` for a decimal `n`.
  fn slugs_with_stem<'a>(
    &'a self,
    stem: &'a str,
    scope: &'a Scope,
  ) -> impl Future<Output = Result<Vec<SlugOccupant>, Self::Error>> + Send + 'a;
}

/// Parse the numeric suffix of `slug` relative to `stem`.
///
/// `stem` itself yields `Some(0)`, `stem-7` yields `Some(7)`, anything else
/// `None`. Shared by backends when filtering [`RouteStore::slugs_with_stem`]
/// candidates.
pub fn stem_suffix(slug: &str, stem: &str) -> Option<u64> {
  if slug == stem {
    return Some(0);
  }
  let digits = slug.strip_prefix(stem)?.strip_prefix('-')?;
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  // `-0` and zero-padded suffixes are never generated.
  if digits.starts_with('0') {
    return None;
  }
  digits.parse().ok()
}

/// A unit of work over a store.
///
/// Staged routes live in the session, not in the store, so concurrent
/// sessions never see or commit each other's writes. Dropping a session
/// discards whatever it has not flushed.
pub struct Session<'s, S: RouteStore> {
  store:  &'s S,
  staged: Vec<Route>,
}

impl<'s, S: RouteStore> Session<'s, S> {
  pub fn new(store: &'s S) -> Self { Self { store, staged: Vec::new() } }

  /// Stage an insert-or-update of `route`. The slug is checked for
  /// well-formedness here; uniqueness is checked when the batch commits.
  pub fn save(&mut self, route: Route) -> crate::Result<()> {
    slug::validate(&route.slug)?;
    self.staged.push(route);
    Ok(())
  }

  /// Number of routes waiting for the next flush.
  pub fn staged(&self) -> usize { self.staged.len() }

  /// Commit everything staged so far. The stage is empty afterwards
  /// whether or not the commit succeeded.
  pub async fn flush(&mut self) -> Result<usize, S::Error> {
    let batch = std::mem::take(&mut self.staged);
    if batch.is_empty() {
      return Ok(0);
    }
    self.store.commit(batch).await
  }

  pub fn discard(&mut self) { self.staged.clear(); }
}

/// A lazily paged, restartable walk over the live descendants of a root.
///
/// Each call to [`next_page`](Descendants::next_page) issues one bounded
/// query. Restarting from a saved [`cursor`](Descendants::cursor) resumes
/// exactly where the walk left off.
pub struct Descendants<'s, S: RouteStore> {
  store:     &'s S,
  root:      String,
  scope:     Scope,
  cursor:    Option<DescendantCursor>,
  page_size: usize,
  done:      bool,
}

impl<'s, S: RouteStore> Descendants<'s, S> {
  pub fn new(store: &'s S, root: impl Into<String>, scope: Scope, page_size: usize) -> Self {
    Self {
      store,
      root: root.into(),
      scope,
      cursor: None,
      page_size: page_size.max(1),
      done: false,
    }
  }

  pub fn resume_from(mut self, cursor: Option<DescendantCursor>) -> Self {
    self.cursor = cursor;
    self
  }

  pub fn cursor(&self) -> Option<&DescendantCursor> { self.cursor.as_ref() }

  /// Fetch the next page; an empty page means the walk is finished.
  pub async fn next_page(&mut self) -> Result<Vec<Route>, S::Error> {
    if self.done {
      return Ok(Vec::new());
    }
    let page = self
      .store
      .descendants_page(&self.root, &self.scope, self.cursor.as_ref(), self.page_size)
      .await?;
    match page.last() {
      Some(last) => self.cursor = Some(DescendantCursor::after(last)),
      None => self.done = true,
    }
    if page.len() < self.page_size {
      self.done = true;
    }
    Ok(page)
  }
}
