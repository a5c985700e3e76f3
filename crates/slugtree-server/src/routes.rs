//! Handlers for `/routes` endpoints.
//!
//! Routes are addressed by the resource that owns them, never by route id:
//! a resource has at most one live route per locale and site.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use slugtree_core::{
  cascade::{CascadeReport, SlugSource},
  route::{ResourceRef, Route, Scope},
  store::RouteStore,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ScopeParams {
  pub locale: String,
  pub site:   Option<String>,
}

impl ScopeParams {
  fn scope(&self) -> Scope { Scope::new(self.locale.clone(), self.site.as_deref()) }
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub resource_key: String,
  pub resource_id:  String,
  pub locale:       String,
  pub site:         Option<String>,
  /// Full desired path. Takes precedence over `title`.
  pub slug:         Option<String>,
  /// Last segment, placed below `parent` (or the root).
  pub title:        Option<String>,
  pub parent:       Option<ResourceRef>,
}

/// `POST /routes`
///
/// Body: `{"resource_key":"page","resource_id":"7","locale":"en","slug":"/about"}`
/// or `{..., "title":"Team","parent":{"resource_key":"page","resource_id":"7"}}`.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RouteStore + 'static,
{
  let resource = ResourceRef::new(body.resource_key, body.resource_id);
  let scope = Scope::new(body.locale, body.site.as_deref());

  let route = match (body.slug, body.title) {
    (Some(slug), _) => state.manager.create(resource, scope, &slug).await?,
    (None, Some(title)) => {
      state
        .manager
        .create_child(resource, scope, body.parent.as_ref(), &title)
        .await?
    }
    (None, None) => {
      return Err(ApiError::BadRequest("either slug or title is required".into()));
    }
  };
  Ok((StatusCode::CREATED, Json(route)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /routes/{key}/{id}?locale=<locale>[&site=<site>]`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path((key, id)): Path<(String, String)>,
  Query(params): Query<ScopeParams>,
) -> Result<Json<Route>, ApiError>
where
  S: RouteStore + 'static,
{
  let route = state
    .manager
    .route_for(&ResourceRef::new(key, id), &params.scope())
    .await?;
  Ok(Json(route))
}

// ─── Change slug ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChangeBody {
  pub locale: String,
  pub site:   Option<String>,
  pub slug:   String,
  #[serde(default)]
  pub source: SlugSource,
}

/// `PUT /routes/{key}/{id}` — body: `{"locale":"en","slug":"/new-path"}`
///
/// Runs the cascade to completion before answering. An interrupted cascade
/// answers `503`; sending the same request again resumes it.
pub async fn change_slug<S>(
  State(state): State<AppState<S>>,
  Path((key, id)): Path<(String, String)>,
  Json(body): Json<ChangeBody>,
) -> Result<Json<CascadeReport>, ApiError>
where
  S: RouteStore + 'static,
{
  let scope = Scope::new(body.locale, body.site.as_deref());
  let report = state
    .manager
    .on_slug_change(&ResourceRef::new(key, id), &scope, &body.slug, body.source)
    .await?;
  Ok(Json(report))
}

// ─── Move ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MoveBody {
  pub locale: String,
  pub site:   Option<String>,
  /// New parent resource; `null` moves the route to the top level.
  pub parent: Option<ResourceRef>,
}

/// `POST /routes/{key}/{id}/move`
pub async fn move_under<S>(
  State(state): State<AppState<S>>,
  Path((key, id)): Path<(String, String)>,
  Json(body): Json<MoveBody>,
) -> Result<Json<CascadeReport>, ApiError>
where
  S: RouteStore + 'static,
{
  let scope = Scope::new(body.locale, body.site.as_deref());
  let report = state
    .manager
    .move_under(&ResourceRef::new(key, id), &scope, body.parent.as_ref())
    .await?;
  Ok(Json(report))
}

// ─── Remove ──────────────────────────────────────────────────────────────────

/// `DELETE /routes/{key}/{id}` — all locales and sites.
pub async fn remove<S>(
  State(state): State<AppState<S>>,
  Path((key, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RouteStore + 'static,
{
  let removed = state
    .manager
    .remove_resource(&ResourceRef::new(key, id))
    .await?;
  Ok(Json(json!({ "removed": removed })))
}
