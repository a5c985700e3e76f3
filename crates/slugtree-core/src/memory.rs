//! [`MemoryRouteStore`] — an in-process, sorted-key [`RouteStore`].
//!
//! Slugs are indexed in a `BTreeMap` keyed by `(locale, site, slug)` and live
//! routes additionally by `(locale, site, depth, slug)`, so both exact
//! lookups and depth-ordered subtree scans are range queries.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap, HashSet},
  ops::Bound,
};

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
  Error, Result,
  route::{DescendantCursor, NewRoute, ResourceRef, Route, Scope, SlugLookup, SlugOccupant},
  slug,
  store::{MAX_FORWARD_HOPS, RouteStore, stem_suffix},
};

type SlugKey = (String, String, String);
type DepthKey = (String, String, usize, String);
type ResourceKey = (String, String, String, String);

fn site_key(site: Option<&str>) -> String { site.unwrap_or_default().to_owned() }

fn slug_key(route: &Route) -> SlugKey {
  (route.locale.clone(), site_key(route.site.as_deref()), route.slug.clone())
}

fn depth_key(route: &Route) -> DepthKey {
  (
    route.locale.clone(),
    site_key(route.site.as_deref()),
    route.depth(),
    route.slug.clone(),
  )
}

fn resource_key(route: &Route) -> ResourceKey {
  (
    route.resource_key.clone(),
    route.resource_id.clone(),
    route.locale.clone(),
    site_key(route.site.as_deref()),
  )
}

// ─── Indexed table ───────────────────────────────────────────────────────────

/// Inverse of one applied mutation.
enum Undo {
  Restore(Route),
  Delete(Uuid),
}

#[derive(Default)]
struct Table {
  rows:          HashMap<Uuid, Route>,
  by_slug:       BTreeMap<SlugKey, Uuid>,
  live_by_depth: BTreeSet<DepthKey>,
  live_by_owner: HashMap<ResourceKey, Uuid>,
  max_depth:     usize,
}

impl Table {
  fn insert_row(&mut self, route: Route) {
    self.by_slug.insert(slug_key(&route), route.id);
    if !route.history {
      self.max_depth = self.max_depth.max(route.depth());
      self.live_by_depth.insert(depth_key(&route));
      self.live_by_owner.insert(resource_key(&route), route.id);
    }
    self.rows.insert(route.id, route);
  }

  fn remove_row(&mut self, id: Uuid) -> Option<Route> {
    let route = self.rows.remove(&id)?;
    self.by_slug.remove(&slug_key(&route));
    if !route.history {
      self.live_by_depth.remove(&depth_key(&route));
      self.live_by_owner.remove(&resource_key(&route));
    }
    Some(route)
  }

  /// Insert or replace `route`, reclaiming a history row at its slug.
  fn upsert(&mut self, route: Route, undo: &mut Vec<Undo>) -> Result<()> {
    if let Some(&holder) = self.by_slug.get(&slug_key(&route))
      && holder != route.id
    {
      let reclaimable = self.rows.get(&holder).is_some_and(|r| r.history);
      if !reclaimable {
        return Err(Error::DuplicateSlug {
          slug:   route.slug,
          locale: route.locale,
          site:   route.site,
        });
      }
      if let Some(old) = self.remove_row(holder) {
        undo.push(Undo::Restore(old));
      }
    }

    if !route.history
      && let Some(&owner) = self.live_by_owner.get(&resource_key(&route))
      && owner != route.id
    {
      return Err(Error::DuplicateRoute {
        resource_key: route.resource_key,
        resource_id:  route.resource_id,
        locale:       route.locale,
      });
    }

    match self.remove_row(route.id) {
      Some(previous) => undo.push(Undo::Restore(previous)),
      None => undo.push(Undo::Delete(route.id)),
    }
    self.insert_row(route);
    Ok(())
  }

  fn rollback(&mut self, undo: Vec<Undo>) {
    for step in undo.into_iter().rev() {
      match step {
        Undo::Delete(id) => {
          self.remove_row(id);
        }
        Undo::Restore(route) => {
          self.remove_row(route.id);
          self.insert_row(route);
        }
      }
    }
  }

  fn lookup(&self, slug: &str, scope: &Scope) -> Option<&Route> {
    let key = (scope.locale.clone(), site_key(scope.site.as_deref()), slug.to_owned());
    self.by_slug.get(&key).and_then(|id| self.rows.get(id))
  }

  fn follow(&self, history: &Route) -> Option<Route> {
    let mut next = history.target_id;
    for _ in 0..MAX_FORWARD_HOPS {
      let route = self.rows.get(&next?)?;
      if !route.history {
        return Some(route.clone());
      }
      next = route.target_id;
    }
    None
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A route store held entirely in memory.
///
/// Wrap it in an `Arc` to share it; the table sits behind a mutex that is
/// never held across an await point.
#[derive(Default)]
pub struct MemoryRouteStore {
  table: Mutex<Table>,
}

impl MemoryRouteStore {
  pub fn new() -> Self { Self::default() }

  /// Number of committed rows, live and history.
  pub fn len(&self) -> usize { self.table.lock().rows.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Snapshot of every committed row, ordered by slug within each scope.
  pub fn all_routes(&self) -> Vec<Route> {
    let table = self.table.lock();
    table
      .by_slug
      .values()
      .filter_map(|id| table.rows.get(id).cloned())
      .collect()
  }
}

impl RouteStore for MemoryRouteStore {
  type Error = Error;

  async fn add(&self, input: NewRoute) -> Result<Route> {
    let route = Route::live(input);
    let mut table = self.table.lock();
    let mut undo = Vec::new();
    if let Err(e) = table.upsert(route.clone(), &mut undo) {
      table.rollback(undo);
      return Err(e);
    }
    Ok(route)
  }

  async fn remove(&self, id: Uuid) -> Result<bool> {
    Ok(self.table.lock().remove_row(id).is_some())
  }

  async fn remove_all_for_resource(&self, resource: &ResourceRef) -> Result<usize> {
    let mut table = self.table.lock();

    let owned: HashSet<Uuid> = table
      .rows
      .values()
      .filter(|r| r.belongs_to(resource))
      .map(|r| r.id)
      .collect();
    let doomed: Vec<Uuid> = table
      .rows
      .values()
      .filter(|r| owned.contains(&r.id) || r.target_id.is_some_and(|t| owned.contains(&t)))
      .map(|r| r.id)
      .collect();

    for id in &doomed {
      table.remove_row(*id);
    }
    let now = Utc::now();
    for route in table.rows.values_mut() {
      if route.parent_id.is_some_and(|p| owned.contains(&p)) {
        route.parent_id = None;
        route.changed_at = now;
      }
    }

    Ok(doomed.len())
  }

  async fn commit(&self, batch: Vec<Route>) -> Result<usize> {
    let count = batch.len();
    let mut table = self.table.lock();
    let mut undo = Vec::with_capacity(count);
    for route in batch {
      if let Err(e) = table.upsert(route, &mut undo) {
        table.rollback(undo);
        tracing::debug!(error = %e, "memory commit rolled back");
        return Err(e);
      }
    }
    Ok(count)
  }

  async fn get(&self, id: Uuid) -> Result<Option<Route>> {
    Ok(self.table.lock().rows.get(&id).cloned())
  }

  async fn find_one_by(&self, resource: &ResourceRef, scope: &Scope) -> Result<Option<Route>> {
    let key = (
      resource.resource_key.clone(),
      resource.resource_id.clone(),
      scope.locale.clone(),
      site_key(scope.site.as_deref()),
    );
    let table = self.table.lock();
    Ok(table.live_by_owner.get(&key).and_then(|id| table.rows.get(id)).cloned())
  }

  async fn find_by_slug(&self, slug: &str, scope: &Scope) -> Result<SlugLookup> {
    let table = self.table.lock();
    Ok(match table.lookup(slug, scope) {
      None => SlugLookup::NotFound,
      Some(route) if !route.history => SlugLookup::Current(route.clone()),
      Some(route) => SlugLookup::History { target: table.follow(route), route: route.clone() },
    })
  }

  async fn find_children(&self, parent: Uuid) -> Result<Vec<Route>> {
    let table = self.table.lock();
    let mut children: Vec<Route> = table
      .rows
      .values()
      .filter(|r| !r.history && r.parent_id == Some(parent))
      .cloned()
      .collect();
    children.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(children)
  }

  async fn find_history(&self, target: Uuid) -> Result<Vec<Route>> {
    let table = self.table.lock();
    let mut history: Vec<Route> = table
      .rows
      .values()
      .filter(|r| r.history && r.target_id == Some(target))
      .cloned()
      .collect();
    history.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(history)
  }

  async fn descendants_page(
    &self,
    root: &str,
    scope: &Scope,
    after: Option<&DescendantCursor>,
    limit: usize,
  ) -> Result<Vec<Route>> {
    let (lower, upper) = slug::subtree_range(root);
    let site = site_key(scope.site.as_deref());
    let first_depth = slug::depth(root) + 1;
    let start_depth = after.map_or(first_depth, |c| c.depth.max(first_depth));

    let table = self.table.lock();
    let mut page = Vec::with_capacity(limit.min(1024));

    for depth in start_depth..=table.max_depth {
      let from = match after {
        Some(c) if c.depth == depth && c.slug > lower => c.slug.clone(),
        _ => lower.clone(),
      };
      if from >= upper {
        continue;
      }
      let range = (
        Bound::Excluded((scope.locale.clone(), site.clone(), depth, from)),
        Bound::Excluded((scope.locale.clone(), site.clone(), depth, upper.clone())),
      );
      for (.., slug) in table.live_by_depth.range(range) {
        if let Some(route) = table.lookup(slug, scope) {
          page.push(route.clone());
        }
        if page.len() >= limit {
          return Ok(page);
        }
      }
    }

    Ok(page)
  }

  async fn slugs_with_stem(&self, stem: &str, scope: &Scope) -> Result<Vec<SlugOccupant>> {
    let site = site_key(scope.site.as_deref());
    let upper = format!("{stem}.");
    let range = (
      Bound::Included((scope.locale.clone(), site.clone(), stem.to_owned())),
      Bound::Excluded((scope.locale.clone(), site, upper)),
    );

    let table = self.table.lock();
    Ok(
      table
        .by_slug
        .range(range)
        .filter(|((.., slug), _)| stem_suffix(slug, stem).is_some())
        .filter_map(|(_, id)| table.rows.get(id))
        .map(|r| SlugOccupant { slug: r.slug.clone(), resource: r.resource(), history: r.history })
        .collect(),
    )
  }
}
