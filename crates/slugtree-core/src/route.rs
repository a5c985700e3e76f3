//! Route — the mapping from a resource in a scope to a slug.
//!
//! A route is either live (the resource's current URL) or history (a retired
//! URL that redirects to a live route). History routes reference their
//! target by id, never by slug, so renaming the target does not lengthen
//! redirect chains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slug;

// ─── Identity ────────────────────────────────────────────────────────────────

/// The owning domain object of a route, e.g. `("page", "42")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
  pub resource_key: String,
  pub resource_id:  String,
}

impl ResourceRef {
  pub fn new(resource_key: impl Into<String>, resource_id: impl Into<String>) -> Self {
    Self { resource_key: resource_key.into(), resource_id: resource_id.into() }
  }
}

impl std::fmt::Display for ResourceRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.resource_key, self.resource_id)
  }
}

/// The uniqueness scope of a slug: a locale within an optional site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
  pub locale: String,
  /// Tenant/webspace discriminator; `None` for single-site deployments.
  pub site:   Option<String>,
}

impl Scope {
  pub fn new(locale: impl Into<String>, site: Option<&str>) -> Self {
    Self { locale: locale.into(), site: site.map(str::to_owned) }
  }
}

// ─── Route ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
  pub id:           Uuid,
  pub resource_key: String,
  pub resource_id:  String,
  pub locale:       String,
  pub site:         Option<String>,
  pub slug:         String,
  pub history:      bool,
  /// Weak reference to the parent route; used only for traversal.
  pub parent_id:    Option<Uuid>,
  /// For history routes: the live route this one redirects to.
  pub target_id:    Option<Uuid>,
  pub created_at:   DateTime<Utc>,
  pub changed_at:   DateTime<Utc>,
}

impl Route {
  /// Build a fresh live route from a creation request.
  pub fn live(input: NewRoute) -> Self {
    let now = Utc::now();
    Self {
      id:           Uuid::new_v4(),
      resource_key: input.resource.resource_key,
      resource_id:  input.resource.resource_id,
      locale:       input.scope.locale,
      site:         input.scope.site,
      slug:         input.slug,
      history:      false,
      parent_id:    input.parent_id,
      target_id:    None,
      created_at:   now,
      changed_at:   now,
    }
  }

  /// A history route at `old_slug` redirecting to `self`.
  pub fn retire(&self, old_slug: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id:           Uuid::new_v4(),
      resource_key: self.resource_key.clone(),
      resource_id:  self.resource_id.clone(),
      locale:       self.locale.clone(),
      site:         self.site.clone(),
      slug:         old_slug.into(),
      history:      true,
      parent_id:    None,
      target_id:    Some(self.id),
      created_at:   now,
      changed_at:   now,
    }
  }

  pub fn resource(&self) -> ResourceRef {
    ResourceRef::new(self.resource_key.clone(), self.resource_id.clone())
  }

  pub fn scope(&self) -> Scope {
    Scope { locale: self.locale.clone(), site: self.site.clone() }
  }

  pub fn depth(&self) -> usize { slug::depth(&self.slug) }

  pub fn belongs_to(&self, resource: &ResourceRef) -> bool {
    self.resource_key == resource.resource_key && self.resource_id == resource.resource_id
  }
}

/// Input for creating a live route.
#[derive(Debug, Clone)]
pub struct NewRoute {
  pub resource:  ResourceRef,
  pub scope:     Scope,
  pub slug:      String,
  pub parent_id: Option<Uuid>,
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

/// Result of an exact slug lookup.
#[derive(Debug, Clone)]
pub enum SlugLookup {
  NotFound,
  Current(Route),
  History {
    route:  Route,
    /// The live route at the end of the forward chain, if the chain is
    /// intact.
    target: Option<Route>,
  },
}

/// What an incoming request path resolves to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
  /// The path is the resource's current URL.
  Direct { route: Route },
  /// The path is retired; answer with a permanent redirect to `to`.
  Redirect { to: String, route: Route },
  NotFound,
}

/// A slug currently occupied in a scope, as seen by the suffix search.
#[derive(Debug, Clone)]
pub struct SlugOccupant {
  pub slug:     String,
  pub resource: ResourceRef,
  pub history:  bool,
}

/// Keyset position in a depth-ordered descendant scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DescendantCursor {
  pub depth: usize,
  pub slug:  String,
}

impl DescendantCursor {
  pub fn after(route: &Route) -> Self {
    Self { depth: route.depth(), slug: route.slug.clone() }
  }
}
