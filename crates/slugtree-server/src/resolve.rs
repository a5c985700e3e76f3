//! `GET /resolve` — map a request path to its route.

use axum::{
  Json,
  extract::{Query, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use slugtree_core::{
  route::{Resolution, Scope},
  store::RouteStore,
};

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
  pub slug:   String,
  pub locale: String,
  pub site:   Option<String>,
}

/// `GET /resolve?slug=<path>&locale=<locale>[&site=<site>]`
///
/// Live slugs answer `200` with the route. Retired slugs answer `301` with
/// `Location` set to the live slug and the live route as the body.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ResolveParams>,
) -> Result<Response, ApiError>
where
  S: RouteStore + 'static,
{
  let scope = Scope::new(params.locale, params.site.as_deref());

  match state.manager.resolve_path(&params.slug, &scope).await? {
    Resolution::Direct { route } => Ok(Json(route).into_response()),
    Resolution::Redirect { to, route } => Ok(
      (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, to)], Json(route)).into_response(),
    ),
    Resolution::NotFound => Err(ApiError::NotFound(format!("no route at {}", params.slug))),
  }
}
