//! Core types and the route tree maintenance engine.
//!
//! Every content-bearing resource owns exactly one live route per
//! `(locale, site)` scope. Renaming or moving a route rewrites the slugs of
//! its whole subtree and leaves history routes behind so old URLs keep
//! redirecting to the live ones.
//!
//! This crate has no database dependency. Storage backends implement
//! [`store::RouteStore`]; [`memory::MemoryRouteStore`] is the in-process
//! sorted-key backend.

// `RouteStore` spells out `Send` on each method's future, so backends can
// implement it with plain `async fn`.
#![allow(async_fn_in_trait)]

pub mod cascade;
pub mod error;
pub mod lock;
pub mod manager;
pub mod memory;
pub mod resolver;
pub mod route;
pub mod slug;
pub mod store;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
