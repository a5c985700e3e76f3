//! Encoding and decoding helpers between [`Route`] and the plain-text
//! representation stored in the `routes` table.
//!
//! Timestamps are RFC 3339 strings and UUIDs hyphenated lowercase strings.
//! A missing site is stored as the empty string so that the unique slug
//! index also covers single-site deployments.

use chrono::{DateTime, Utc};
use slugtree_core::route::{Route, Scope};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_site(site: Option<&str>) -> String { site.unwrap_or_default().to_owned() }

pub fn decode_site(s: String) -> Option<String> { (!s.is_empty()).then_some(s) }

/// `(locale, site)` columns of a scope.
pub fn encode_scope(scope: &Scope) -> (String, String) {
  (scope.locale.clone(), encode_site(scope.site.as_deref()))
}

// ─── Row type ────────────────────────────────────────────────────────────────

/// Column list matching [`RouteRow::from_row`].
pub const ROUTE_COLUMNS: &str = "route_id, resource_key, resource_id, locale, site, slug, \
                                 depth, history, parent_id, target_id, created_at, changed_at";

/// A `routes` row as stored, used in both directions.
pub struct RouteRow {
  pub route_id:     String,
  pub resource_key: String,
  pub resource_id:  String,
  pub locale:       String,
  pub site:         String,
  pub slug:         String,
  pub depth:        i64,
  pub history:      bool,
  pub parent_id:    Option<String>,
  pub target_id:    Option<String>,
  pub created_at:   String,
  pub changed_at:   String,
}

impl RouteRow {
  pub fn encode(route: &Route) -> Self {
    Self {
      route_id:     encode_uuid(route.id),
      resource_key: route.resource_key.clone(),
      resource_id:  route.resource_id.clone(),
      locale:       route.locale.clone(),
      site:         encode_site(route.site.as_deref()),
      slug:         route.slug.clone(),
      depth:        route.depth() as i64,
      history:      route.history,
      parent_id:    route.parent_id.map(encode_uuid),
      target_id:    route.target_id.map(encode_uuid),
      created_at:   encode_dt(route.created_at),
      changed_at:   encode_dt(route.changed_at),
    }
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      route_id:     row.get(0)?,
      resource_key: row.get(1)?,
      resource_id:  row.get(2)?,
      locale:       row.get(3)?,
      site:         row.get(4)?,
      slug:         row.get(5)?,
      depth:        row.get(6)?,
      history:      row.get(7)?,
      parent_id:    row.get(8)?,
      target_id:    row.get(9)?,
      created_at:   row.get(10)?,
      changed_at:   row.get(11)?,
    })
  }

  pub fn into_route(self) -> Result<Route> {
    Ok(Route {
      id:           decode_uuid(&self.route_id)?,
      resource_key: self.resource_key,
      resource_id:  self.resource_id,
      locale:       self.locale,
      site:         decode_site(self.site),
      slug:         self.slug,
      history:      self.history,
      parent_id:    self.parent_id.as_deref().map(decode_uuid).transpose()?,
      target_id:    self.target_id.as_deref().map(decode_uuid).transpose()?,
      created_at:   decode_dt(&self.created_at)?,
      changed_at:   decode_dt(&self.changed_at)?,
    })
  }
}

pub fn decode_rows(rows: Vec<RouteRow>) -> Result<Vec<Route>> {
  rows.into_iter().map(RouteRow::into_route).collect()
}
