//! [`RouteChangeCascade`] — renames a route and rewrites its subtree.
//!
//! A cascade moves through `Preparing → RewritingRoot →
//! RewritingDescendants → Flushing → Done`. Nothing is written until
//! `Preparing` succeeds. Descendants are pulled from the store page by page
//! in `(depth, slug)` order, rebased onto the new prefix, staged in a
//! [`Session`] and flushed every `batch_size` routes. A failed or timed-out
//! cascade drops its session, discarding whatever was not yet flushed.
//!
//! The time budget is checked before each page read and each commit. A
//! commit that has started is never cancelled: some backends finish it on a
//! worker thread regardless, and `flushed` must count exactly what landed.
//! Each rewritten route leaves a history route at its old slug that points
//! straight at the live route.
//!
//! The renamed root itself is committed in the final batch. Its slug is the
//! commit marker of the whole operation: if a cascade fails part-way, the
//! root still carries the old slug, so running the same change again scans
//! the old prefix and moves exactly the descendants that were left behind.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
  Error, Result,
  lock::SubtreeLocks,
  resolver::SlugPathResolver,
  route::{ResourceRef, Route, Scope, SlugLookup},
  slug,
  store::{Descendants, RouteStore, Session},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
  /// Descendants rewritten per flush.
  pub batch_size: usize,
  /// Descendants fetched per store query.
  pub page_size:  usize,
  /// Budget for the whole cascade, in milliseconds.
  pub timeout_ms: u64,
}

impl Default for CascadeConfig {
  fn default() -> Self {
    Self { batch_size: 1000, page_size: 500, timeout_ms: 30_000 }
  }
}

impl CascadeConfig {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

// ─── Reporting ───────────────────────────────────────────────────────────────

/// Phase of a running cascade, as reported in traces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CascadeState {
  #[default]
  Preparing,
  RewritingRoot,
  RewritingDescendants,
  Flushing,
  Done,
  Failed,
}

/// Where the requested slug comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlugSource {
  /// Typed by a user; normalised and made unique before use.
  #[default]
  UserInput,
  /// Already normalised and known to be free; only checked for
  /// well-formedness.
  Validated,
}

/// Outcome of a finished cascade.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeReport {
  pub route_id:        Uuid,
  pub old_slug:        String,
  pub new_slug:        String,
  /// Descendants moved onto the new prefix.
  pub rewritten:       usize,
  pub history_created: usize,
  pub batches:         usize,
}

impl CascadeReport {
  fn unchanged(route: &Route) -> Self {
    Self {
      route_id:        route.id,
      old_slug:        route.slug.clone(),
      new_slug:        route.slug.clone(),
      rewritten:       0,
      history_created: 0,
      batches:         0,
    }
  }

  pub fn changed(&self) -> bool { self.old_slug != self.new_slug }
}

#[derive(Default)]
struct Progress {
  state:   CascadeState,
  /// Descendants committed by completed flushes.
  flushed: usize,
  /// Descendants staged since the last flush.
  pending: usize,
  batches: usize,
  history: usize,
}

impl Progress {
  fn enter(&mut self, state: CascadeState) {
    tracing::trace!(from = ?self.state, to = ?state, "cascade state");
    self.state = state;
  }
}

/// Wall-clock allowance of one cascade.
struct Budget {
  started:  Instant,
  deadline: Instant,
}

impl Budget {
  fn new(limit: Duration) -> Self {
    let started = Instant::now();
    Self { started, deadline: started + limit }
  }

  fn expired(&self, flushed: usize) -> Error {
    Error::CascadeTimeout { flushed, after: self.started.elapsed() }
  }

  fn check(&self, progress: &Progress) -> Result<()> {
    if Instant::now() >= self.deadline {
      return Err(self.expired(progress.flushed));
    }
    Ok(())
  }
}

// ─── Cascade ─────────────────────────────────────────────────────────────────

/// Applies slug changes to a route and its whole subtree.
///
/// Holds no persistent state; all reads and writes go through the store.
/// Cascades sharing a [`SubtreeLocks`] registry never run concurrently on
/// overlapping subtrees.
pub struct RouteChangeCascade<S> {
  store:    Arc<S>,
  resolver: SlugPathResolver<S>,
  locks:    SubtreeLocks,
  config:   CascadeConfig,
}

impl<S: RouteStore> RouteChangeCascade<S> {
  pub fn new(store: Arc<S>, config: CascadeConfig) -> Self {
    Self {
      resolver: SlugPathResolver::new(Arc::clone(&store)),
      store,
      locks: SubtreeLocks::new(),
      config,
    }
  }

  /// Share a lock registry with other cascades over the same store.
  pub fn with_locks(mut self, locks: SubtreeLocks) -> Self {
    self.locks = locks;
    self
  }

  pub fn locks(&self) -> &SubtreeLocks { &self.locks }

  pub fn config(&self) -> &CascadeConfig { &self.config }

  /// Move the live route of `resource` in `scope` to `desired` and rewrite
  /// its descendants.
  ///
  /// Calling this again with the same arguments is a no-op once the first
  /// call succeeded, and finishes the job if the first call failed.
  pub async fn on_slug_change(
    &self,
    resource: &ResourceRef,
    scope: &Scope,
    desired: &str,
    source: SlugSource,
  ) -> Result<CascadeReport> {
    // ── Preparing ─────────────────────────────────────────────────────────
    let route = self
      .store
      .find_one_by(resource, scope)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or_else(|| Error::NotFound(format!("route of {resource} in {}", scope.locale)))?;

    let new_slug = match source {
      SlugSource::UserInput => self.resolver.resolve_for(desired, scope, resource).await?,
      SlugSource::Validated => {
        slug::validate(desired)?;
        // The root commits last, so a live clash must be caught up front.
        if let SlugLookup::Current(holder) =
          self.store.find_by_slug(desired, scope).await.map_err(Into::<Error>::into)?
          && holder.id != route.id
        {
          return Err(Error::DuplicateSlug {
            slug:   desired.to_owned(),
            locale: scope.locale.clone(),
            site:   scope.site.clone(),
          });
        }
        desired.to_owned()
      }
    };

    if new_slug == route.slug {
      tracing::debug!(%resource, slug = %route.slug, "slug unchanged");
      return Ok(CascadeReport::unchanged(&route));
    }
    if slug::is_within(&new_slug, &route.slug) {
      return Err(Error::invalid(&new_slug, "a route cannot move below itself"));
    }

    let _guard = self.locks.try_lock(scope, &[&route.slug, &new_slug])?;

    // A cascade that finished between the read above and the lock may have
    // moved the route; its old slug no longer describes the subtree.
    let current = self
      .store
      .find_one_by(resource, scope)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or_else(|| Error::NotFound(format!("route of {resource} in {}", scope.locale)))?;
    if current.id != route.id || current.slug != route.slug {
      tracing::debug!(%resource, read = %route.slug, now = %current.slug, "route moved before lock");
      return Err(Error::ConcurrentCascade { slug: route.slug });
    }

    tracing::info!(
      %resource,
      locale = %scope.locale,
      site = ?scope.site,
      old = %route.slug,
      new = %new_slug,
      "cascade started"
    );

    let budget = Budget::new(self.config.timeout());
    let mut progress = Progress::default();
    let outcome = self.rewrite(&route, &new_slug, &budget, &mut progress).await;

    match outcome {
      Ok(report) => {
        tracing::info!(
          %resource,
          rewritten = report.rewritten,
          batches = report.batches,
          elapsed_ms = budget.started.elapsed().as_millis() as u64,
          "cascade finished"
        );
        Ok(report)
      }
      Err(err @ Error::CascadeTimeout { .. }) => {
        tracing::warn!(%resource, flushed = progress.flushed, state = ?progress.state, "cascade timed out");
        progress.enter(CascadeState::Failed);
        Err(err)
      }
      Err(source) => {
        tracing::warn!(
          %resource,
          flushed = progress.flushed,
          state = ?progress.state,
          error = %source,
          "cascade aborted"
        );
        progress.enter(CascadeState::Failed);
        Err(Error::CascadeAborted { flushed: progress.flushed, source: Box::new(source) })
      }
    }
  }

  async fn rewrite(
    &self,
    route: &Route,
    new_slug: &str,
    budget: &Budget,
    progress: &mut Progress,
  ) -> Result<CascadeReport> {
    let scope = route.scope();
    let old_slug = route.slug.as_str();
    let batch_size = self.config.batch_size.max(1);

    // ── Rewriting root ────────────────────────────────────────────────────
    progress.enter(CascadeState::RewritingRoot);
    let mut renamed = route.clone();
    renamed.slug = new_slug.to_owned();
    renamed.history = false;
    renamed.parent_id = nearest_live_ancestor(&*self.store, new_slug, &scope).await?;
    renamed.changed_at = Utc::now();
    let root_history = route.retire(old_slug);

    // ── Rewriting descendants ─────────────────────────────────────────────
    progress.enter(CascadeState::RewritingDescendants);
    let mut walk = Descendants::new(&*self.store, old_slug, scope, self.config.page_size);
    let mut session = self.store.session();
    let mut rewritten = 0;

    loop {
      budget.check(progress)?;
      let page = match tokio::time::timeout_at(budget.deadline, walk.next_page()).await {
        Ok(page) => page.map_err(Into::<Error>::into)?,
        Err(_) => return Err(budget.expired(progress.flushed)),
      };
      if page.is_empty() {
        break;
      }

      for descendant in page {
        let Some(rebased) = slug::rebase(&descendant.slug, old_slug, new_slug) else {
          continue;
        };
        let history = descendant.retire(descendant.slug.clone());
        let mut moved = descendant;
        moved.slug = rebased;
        moved.changed_at = Utc::now();

        // The move vacates the old slug before the history row claims it.
        session.save(moved)?;
        session.save(history)?;
        progress.pending += 1;
        progress.history += 1;
        rewritten += 1;

        if progress.pending >= batch_size {
          budget.check(progress)?;
          flush_batch(&mut session, progress).await?;
        }
      }
    }

    // ── Flushing ──────────────────────────────────────────────────────────
    progress.enter(CascadeState::Flushing);
    session.save(renamed)?;
    session.save(root_history)?;
    progress.history += 1;
    budget.check(progress)?;
    flush_batch(&mut session, progress).await?;

    progress.enter(CascadeState::Done);
    Ok(CascadeReport {
      route_id: route.id,
      old_slug: old_slug.to_owned(),
      new_slug: new_slug.to_owned(),
      rewritten,
      history_created: progress.history,
      batches: progress.batches,
    })
  }
}

/// Commit the session's stage and account for it. On error the stage is
/// already gone, so nothing from this batch can leak into a later one.
async fn flush_batch<S: RouteStore>(session: &mut Session<'_, S>, progress: &mut Progress) -> Result<()> {
  let rows = session.flush().await.map_err(Into::<Error>::into)?;
  progress.flushed += progress.pending;
  progress.pending = 0;
  progress.batches += 1;
  tracing::debug!(
    batch = progress.batches,
    rows,
    flushed = progress.flushed,
    "cascade batch committed"
  );
  Ok(())
}

/// The closest live route strictly above `slug`, or `None` if no ancestor
/// path is routed.
pub(crate) async fn nearest_live_ancestor<S: RouteStore>(
  store: &S,
  slug: &str,
  scope: &Scope,
) -> Result<Option<Uuid>> {
  let mut next = slug::parent_of(slug);
  while let Some(candidate) = next {
    if let SlugLookup::Current(parent) =
      store.find_by_slug(candidate, scope).await.map_err(Into::<Error>::into)?
    {
      return Ok(Some(parent.id));
    }
    next = slug::parent_of(candidate);
  }
  Ok(None)
}
