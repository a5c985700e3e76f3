//! [`RouteManager`] — the entry point used by application code.
//!
//! Bundles a store, a resolver and a cascade behind the operations the
//! content pipeline and the request router need.

use std::sync::Arc;

use crate::{
  Error, Result,
  cascade::{CascadeConfig, CascadeReport, RouteChangeCascade, SlugSource, nearest_live_ancestor},
  resolver::SlugPathResolver,
  route::{NewRoute, ResourceRef, Resolution, Route, Scope, SlugLookup},
  slug,
  store::RouteStore,
};

pub struct RouteManager<S> {
  store:    Arc<S>,
  resolver: SlugPathResolver<S>,
  cascade:  RouteChangeCascade<S>,
}

impl<S: RouteStore> RouteManager<S> {
  pub fn new(store: Arc<S>, config: CascadeConfig) -> Self {
    Self {
      resolver: SlugPathResolver::new(Arc::clone(&store)),
      cascade: RouteChangeCascade::new(Arc::clone(&store), config),
      store,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn resolver(&self) -> &SlugPathResolver<S> { &self.resolver }

  pub fn cascade(&self) -> &RouteChangeCascade<S> { &self.cascade }

  // ── Creation ──────────────────────────────────────────────────────────

  /// Give `resource` its first route in `scope`, at the first free slug
  /// derived from `desired`. The parent is the closest routed ancestor path.
  ///
  /// Fails with [`Error::ConcurrentCascade`] while a cascade is rewriting a
  /// subtree that contains or lies below the new slug.
  pub async fn create(&self, resource: ResourceRef, scope: Scope, desired: &str) -> Result<Route> {
    self.ensure_unrouted(&resource, &scope).await?;
    let slug = self.resolver.resolve_for(desired, &scope, &resource).await?;
    let _guard = self.cascade.locks().try_lock(&scope, &[&slug])?;
    let parent_id = nearest_live_ancestor(&*self.store, &slug, &scope).await?;
    self.insert(resource, scope, slug, parent_id).await
  }

  /// Give `resource` a route titled `title` directly below the route of
  /// `parent`, or below the root when `parent` is `None`.
  pub async fn create_child(
    &self,
    resource: ResourceRef,
    scope: Scope,
    parent: Option<&ResourceRef>,
    title: &str,
  ) -> Result<Route> {
    self.ensure_unrouted(&resource, &scope).await?;
    let parent_route = match parent {
      Some(p) => Some(self.route_for(p, &scope).await?),
      None => None,
    };
    let slug = self
      .resolver
      .child_slug(
        parent_route.as_ref().map(|r| r.slug.as_str()),
        title,
        &scope,
        Some(&resource),
      )
      .await?;
    let _guard = self.cascade.locks().try_lock(&scope, &[&slug])?;

    // The parent may have been moved by a cascade that ended before the lock.
    if let (Some(p), Some(read)) = (parent, &parent_route)
      && self.route_for(p, &scope).await?.slug != read.slug
    {
      return Err(Error::ConcurrentCascade { slug: read.slug.clone() });
    }
    self
      .insert(resource, scope, slug, parent_route.map(|r| r.id))
      .await
  }

  async fn ensure_unrouted(&self, resource: &ResourceRef, scope: &Scope) -> Result<()> {
    if self.store.find_one_by(resource, scope).await.map_err(Into::<Error>::into)?.is_some() {
      return Err(Error::DuplicateRoute {
        resource_key: resource.resource_key.clone(),
        resource_id:  resource.resource_id.clone(),
        locale:       scope.locale.clone(),
      });
    }
    Ok(())
  }

  async fn insert(
    &self,
    resource: ResourceRef,
    scope: Scope,
    slug: String,
    parent_id: Option<uuid::Uuid>,
  ) -> Result<Route> {
    let route = self
      .store
      .add(NewRoute { resource, scope, slug, parent_id })
      .await
      .map_err(Into::<Error>::into)?;
    tracing::debug!(id = %route.id, slug = %route.slug, "route created");
    Ok(route)
  }

  // ── Changes ───────────────────────────────────────────────────────────

  /// See [`RouteChangeCascade::on_slug_change`].
  pub async fn on_slug_change(
    &self,
    resource: &ResourceRef,
    scope: &Scope,
    desired: &str,
    source: SlugSource,
  ) -> Result<CascadeReport> {
    self.cascade.on_slug_change(resource, scope, desired, source).await
  }

  /// Move the route of `resource` below the route of `new_parent` (or the
  /// root), keeping its last segment.
  pub async fn move_under(
    &self,
    resource: &ResourceRef,
    scope: &Scope,
    new_parent: Option<&ResourceRef>,
  ) -> Result<CascadeReport> {
    let route = self.route_for(resource, scope).await?;
    let parent_slug = match new_parent {
      Some(p) => self.route_for(p, scope).await?.slug,
      None => slug::ROOT.to_owned(),
    };
    let desired = slug::child_of(&parent_slug, slug::last_segment(&route.slug));
    self
      .cascade
      .on_slug_change(resource, scope, &desired, SlugSource::UserInput)
      .await
  }

  /// Delete every route of `resource` along with the history pointing at
  /// it.
  pub async fn remove_resource(&self, resource: &ResourceRef) -> Result<usize> {
    let removed = self
      .store
      .remove_all_for_resource(resource)
      .await
      .map_err(Into::<Error>::into)?;
    tracing::info!(%resource, removed, "routes removed");
    Ok(removed)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The live route of `resource` in `scope`.
  pub async fn route_for(&self, resource: &ResourceRef, scope: &Scope) -> Result<Route> {
    self
      .store
      .find_one_by(resource, scope)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or_else(|| Error::NotFound(format!("route of {resource} in {}", scope.locale)))
  }

  /// Map an incoming request path to a resource.
  ///
  /// Retired paths answer with a redirect to the live slug at the end of
  /// the forward chain. A trailing `/` is ignored.
  pub async fn resolve_path(&self, path: &str, scope: &Scope) -> Result<Resolution> {
    let path = match path.trim_end_matches('/') {
      "" => slug::ROOT,
      trimmed => trimmed,
    };
    let lookup = self.store.find_by_slug(path, scope).await.map_err(Into::<Error>::into)?;

    Ok(match lookup {
      SlugLookup::NotFound => Resolution::NotFound,
      SlugLookup::Current(route) => Resolution::Direct { route },
      SlugLookup::History { target: Some(target), .. } => {
        Resolution::Redirect { to: target.slug.clone(), route: target }
      }
      SlugLookup::History { route, target: None } => {
        tracing::warn!(id = %route.id, slug = %route.slug, "history route has no live target");
        Resolution::NotFound
      }
    })
  }
}
