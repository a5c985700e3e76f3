//! [`SlugPathResolver`] — turns a desired path into an available slug.

use std::{collections::HashSet, sync::Arc};

use crate::{
  Error, Result,
  route::{ResourceRef, Scope, SlugLookup},
  slug,
  store::{RouteStore, stem_suffix},
};

/// Resolves desired paths against the routes already in a store.
///
/// Collisions are settled by suffixing the last segment with the smallest
/// free `-<n>`. Slugs held by history routes of other resources count as
/// taken, so an old URL keeps redirecting where it used to.
pub struct SlugPathResolver<S> {
  store: Arc<S>,
}

impl<S> Clone for SlugPathResolver<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: RouteStore> SlugPathResolver<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Normalise `desired` and return the first available candidate among
  /// `stem`, `stem-1`, `stem-2`, …
  pub async fn resolve(&self, desired: &str, scope: &Scope) -> Result<String> {
    self.pick(desired, scope, None).await
  }

  /// Like [`resolve`](Self::resolve), but slugs already held by `owner`
  /// (its live route or its history) are available to it.
  pub async fn resolve_for(
    &self,
    desired: &str,
    scope: &Scope,
    owner: &ResourceRef,
  ) -> Result<String> {
    self.pick(desired, scope, Some(owner)).await
  }

  /// Build and resolve the slug of a route titled `title` below `parent`.
  /// Without a parent the route sits directly under the root.
  pub async fn child_slug(
    &self,
    parent: Option<&str>,
    title: &str,
    scope: &Scope,
    owner: Option<&ResourceRef>,
  ) -> Result<String> {
    let segment = slug::normalize_title(title, &scope.locale)?;
    let desired = slug::child_of(parent.unwrap_or(slug::ROOT), &segment);
    self.pick(&desired, scope, owner).await
  }

  /// Whether `slug` is well-formed and currently unclaimed in `scope`.
  pub async fn is_valid(&self, slug: &str, scope: &Scope) -> Result<bool> {
    if slug::validate(slug).is_err() {
      return Ok(false);
    }
    let lookup = self.store.find_by_slug(slug, scope).await.map_err(Into::<Error>::into)?;
    Ok(matches!(lookup, SlugLookup::NotFound))
  }

  async fn pick(&self, desired: &str, scope: &Scope, owner: Option<&ResourceRef>) -> Result<String> {
    let stem = slug::normalize(desired, &scope.locale)?;

    // One query for the whole suffix family instead of one per candidate.
    let occupants = self
      .store
      .slugs_with_stem(&stem, scope)
      .await
      .map_err(Into::<Error>::into)?;
    let taken: HashSet<u64> = occupants
      .iter()
      .filter(|o| owner.is_none_or(|own| o.resource != *own))
      .filter_map(|o| stem_suffix(&o.slug, &stem))
      .collect();

    // The root cannot carry a suffix.
    if stem == slug::ROOT && taken.contains(&0) {
      return Err(Error::DuplicateSlug {
        slug:   stem,
        locale: scope.locale.clone(),
        site:   scope.site.clone(),
      });
    }

    let n = (0u64..).find(|n| !taken.contains(n)).unwrap_or_default();
    Ok(match n {
      0 => stem,
      n => format!("{stem}-{n}"),
    })
  }
}
