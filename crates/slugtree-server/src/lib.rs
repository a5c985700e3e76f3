//! JSON HTTP API over the slug tree.
//!
//! Exposes an axum [`Router`] backed by a [`RouteManager`] over any
//! [`RouteStore`]. Auth, TLS and transport concerns are the caller's
//! responsibility.
//!
//! | Method   | Path                        | Notes                                     |
//! |----------|-----------------------------|-------------------------------------------|
//! | `GET`    | `/resolve`                  | `?slug=&locale=&site=`; 301 for history   |
//! | `POST`   | `/routes`                   | Create from a slug or a parent + title    |
//! | `GET`    | `/routes/{key}/{id}`        | `?locale=&site=`                          |
//! | `PUT`    | `/routes/{key}/{id}`        | Change the slug; returns the cascade run  |
//! | `DELETE` | `/routes/{key}/{id}`        | Every route and redirect of the resource  |
//! | `POST`   | `/routes/{key}/{id}/move`   | Re-parent, keeping the last segment       |

pub mod error;
pub mod resolve;
pub mod routes;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use slugtree_core::{cascade::CascadeConfig, manager::RouteManager, store::RouteStore};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  #[serde(default)]
  pub cascade:    CascadeConfig,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub manager: Arc<RouteManager<S>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self { Self { manager: Arc::clone(&self.manager) } }
}

impl<S: RouteStore> AppState<S> {
  pub fn new(store: Arc<S>, cascade: CascadeConfig) -> Self {
    Self { manager: Arc::new(RouteManager::new(store, cascade)) }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RouteStore + 'static,
{
  Router::new()
    .route("/resolve", get(resolve::handler::<S>))
    .route("/routes", post(routes::create::<S>))
    .route(
      "/routes/{key}/{id}",
      get(routes::get_one::<S>)
        .put(routes::change_slug::<S>)
        .delete(routes::remove::<S>),
    )
    .route("/routes/{key}/{id}/move", post(routes::move_under::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
