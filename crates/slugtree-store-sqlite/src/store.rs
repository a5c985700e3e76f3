//! [`SqliteStore`] — the SQLite implementation of [`RouteStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, Transaction, params, types::Value};
use uuid::Uuid;

use slugtree_core::{
  route::{DescendantCursor, NewRoute, ResourceRef, Route, Scope, SlugLookup, SlugOccupant},
  slug,
  store::{MAX_FORWARD_HOPS, RouteStore, stem_suffix},
};

use crate::{
  Result,
  encode::{ROUTE_COLUMNS, RouteRow, decode_rows, decode_site, encode_dt, encode_scope, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A route store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Every row, live and history, ordered by scope then slug.
  pub async fn all_routes(&self) -> Result<Vec<Route>> {
    self.select("1 = 1 ORDER BY locale, site, slug", Vec::new()).await
  }

  /// Run `SELECT <route columns> FROM routes WHERE <filter>` with positional
  /// arguments.
  async fn select(&self, filter: &'static str, args: Vec<Value>) -> Result<Vec<Route>> {
    let sql = format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE {filter}");
    let rows: Vec<RouteRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), RouteRow::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    decode_rows(rows)
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Apply one insert-or-update inside `tx`.
///
/// A history row holding the slug is deleted first. Model violations are
/// returned as the inner error so the caller can drop (and thereby roll
/// back) the transaction; the outer error is reserved for SQLite itself.
fn upsert(
  tx: &Transaction<'_>,
  row: &RouteRow,
) -> rusqlite::Result<std::result::Result<(), slugtree_core::Error>> {
  let holder: Option<(String, bool)> = tx
    .query_row(
      "SELECT route_id, history FROM routes WHERE locale = ?1 AND site = ?2 AND slug = ?3",
      params![row.locale, row.site, row.slug],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?;

  if let Some((holder_id, history)) = holder
    && holder_id != row.route_id
  {
    if !history {
      return Ok(Err(slugtree_core::Error::DuplicateSlug {
        slug:   row.slug.clone(),
        locale: row.locale.clone(),
        site:   decode_site(row.site.clone()),
      }));
    }
    tx.execute("DELETE FROM routes WHERE route_id = ?1", params![holder_id])?;
  }

  if !row.history {
    let owner: Option<String> = tx
      .query_row(
        "SELECT route_id FROM routes
         WHERE resource_key = ?1 AND resource_id = ?2 AND locale = ?3 AND site = ?4
           AND history = 0",
        params![row.resource_key, row.resource_id, row.locale, row.site],
        |r| r.get(0),
      )
      .optional()?;
    if owner.is_some_and(|id| id != row.route_id) {
      return Ok(Err(slugtree_core::Error::DuplicateRoute {
        resource_key: row.resource_key.clone(),
        resource_id:  row.resource_id.clone(),
        locale:       row.locale.clone(),
      }));
    }
  }

  tx.execute(
    "INSERT INTO routes (
       route_id, resource_key, resource_id, locale, site, slug,
       depth, history, parent_id, target_id, created_at, changed_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
     ON CONFLICT(route_id) DO UPDATE SET
       resource_key = excluded.resource_key,
       resource_id  = excluded.resource_id,
       locale       = excluded.locale,
       site         = excluded.site,
       slug         = excluded.slug,
       depth        = excluded.depth,
       history      = excluded.history,
       parent_id    = excluded.parent_id,
       target_id    = excluded.target_id,
       changed_at   = excluded.changed_at",
    params![
      row.route_id,
      row.resource_key,
      row.resource_id,
      row.locale,
      row.site,
      row.slug,
      row.depth,
      row.history,
      row.parent_id,
      row.target_id,
      row.created_at,
      row.changed_at,
    ],
  )?;
  Ok(Ok(()))
}

// ─── RouteStore impl ─────────────────────────────────────────────────────────

impl RouteStore for SqliteStore {
  type Error = crate::Error;

  // ── Immediate writes ──────────────────────────────────────────────────────

  async fn add(&self, input: NewRoute) -> Result<Route> {
    let route = Route::live(input);
    self.commit(vec![route.clone()]).await?;
    Ok(route)
  }

  async fn remove(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM routes WHERE route_id = ?1", params![id_str])?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn remove_all_for_resource(&self, resource: &ResourceRef) -> Result<usize> {
    let key = resource.resource_key.clone();
    let id = resource.resource_id.clone();
    let now = encode_dt(Utc::now());

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // Orphaned children keep their slug but lose the weak parent link.
        tx.execute(
          "UPDATE routes SET parent_id = NULL, changed_at = ?3
           WHERE parent_id IN (
             SELECT route_id FROM routes WHERE resource_key = ?1 AND resource_id = ?2
           )",
          params![key, id, now],
        )?;
        let redirects = tx.execute(
          "DELETE FROM routes
           WHERE target_id IN (
             SELECT route_id FROM routes WHERE resource_key = ?1 AND resource_id = ?2
           )",
          params![key, id],
        )?;
        let owned = tx.execute(
          "DELETE FROM routes WHERE resource_key = ?1 AND resource_id = ?2",
          params![key, id],
        )?;
        tx.commit()?;
        Ok(redirects + owned)
      })
      .await?;

    Ok(removed)
  }

  async fn commit(&self, batch: Vec<Route>) -> Result<usize> {
    let rows: Vec<RouteRow> = batch.iter().map(RouteRow::encode).collect();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for row in &rows {
          if let Err(e) = upsert(&tx, row)? {
            return Ok(Err(e));
          }
        }
        tx.commit()?;
        Ok(Ok(rows.len()))
      })
      .await?;

    match outcome {
      Ok(written) => {
        tracing::debug!(rows = written, "sqlite batch committed");
        Ok(written)
      }
      Err(e) => {
        tracing::debug!(error = %e, "sqlite batch rolled back");
        Err(e.into())
      }
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get(&self, id: Uuid) -> Result<Option<Route>> {
    let mut found = self
      .select("route_id = ?1", vec![Value::from(encode_uuid(id))])
      .await?;
    Ok(found.pop())
  }

  async fn find_one_by(&self, resource: &ResourceRef, scope: &Scope) -> Result<Option<Route>> {
    let (locale, site) = encode_scope(scope);
    let mut found = self
      .select(
        "resource_key = ?1 AND resource_id = ?2 AND locale = ?3 AND site = ?4 AND history = 0",
        vec![
          Value::from(resource.resource_key.clone()),
          Value::from(resource.resource_id.clone()),
          Value::from(locale),
          Value::from(site),
        ],
      )
      .await?;
    Ok(found.pop())
  }

  async fn find_by_slug(&self, slug: &str, scope: &Scope) -> Result<SlugLookup> {
    let (locale, site) = encode_scope(scope);
    let slug = slug.to_owned();

    let found: Option<(RouteRow, Option<RouteRow>)> = self
      .conn
      .call(move |conn| {
        let by_slug = format!(
          "SELECT {ROUTE_COLUMNS} FROM routes WHERE locale = ?1 AND site = ?2 AND slug = ?3"
        );
        let by_id = format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE route_id = ?1");

        let Some(route) = conn
          .query_row(&by_slug, params![locale, site, slug], RouteRow::from_row)
          .optional()?
        else {
          return Ok(None);
        };
        if !route.history {
          return Ok(Some((route, None)));
        }

        let mut next = route.target_id.clone();
        for _ in 0..MAX_FORWARD_HOPS {
          let Some(id) = next.take() else { break };
          let Some(hop) = conn
            .query_row(&by_id, params![id], RouteRow::from_row)
            .optional()?
          else {
            break;
          };
          if !hop.history {
            return Ok(Some((route, Some(hop))));
          }
          next = hop.target_id.clone();
        }
        Ok(Some((route, None)))
      })
      .await?;

    Ok(match found {
      None => SlugLookup::NotFound,
      Some((route, target)) => {
        let route = route.into_route()?;
        if route.history {
          let target = target.map(RouteRow::into_route).transpose()?;
          SlugLookup::History { route, target }
        } else {
          SlugLookup::Current(route)
        }
      }
    })
  }

  async fn find_children(&self, parent: Uuid) -> Result<Vec<Route>> {
    self
      .select(
        "parent_id = ?1 AND history = 0 ORDER BY slug",
        vec![Value::from(encode_uuid(parent))],
      )
      .await
  }

  async fn find_history(&self, target: Uuid) -> Result<Vec<Route>> {
    self
      .select(
        "target_id = ?1 AND history = 1 ORDER BY slug",
        vec![Value::from(encode_uuid(target))],
      )
      .await
  }

  async fn descendants_page(
    &self,
    root: &str,
    scope: &Scope,
    after: Option<&DescendantCursor>,
    limit: usize,
  ) -> Result<Vec<Route>> {
    let (lower, upper) = slug::subtree_range(root);
    let (locale, site) = encode_scope(scope);
    let (after_depth, after_slug) = after
      .map_or((0, String::new()), |c| (c.depth as i64, c.slug.clone()));

    self
      .select(
        "locale = ?1 AND site = ?2 AND history = 0
           AND slug > ?3 AND slug < ?4
           AND (depth > ?5 OR (depth = ?5 AND slug > ?6))
         ORDER BY depth, slug
         LIMIT ?7",
        vec![
          Value::from(locale),
          Value::from(site),
          Value::from(lower),
          Value::from(upper),
          Value::from(after_depth),
          Value::from(after_slug),
          Value::from(limit as i64),
        ],
      )
      .await
  }

  async fn slugs_with_stem(&self, stem: &str, scope: &Scope) -> Result<Vec<SlugOccupant>> {
    let (locale, site) = encode_scope(scope);
    // `stem-<n>` sorts between `stem` and `stem.`.
    let lower = stem.to_owned();
    let upper = format!("{stem}.");

    let rows: Vec<(String, String, String, bool)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT slug, resource_key, resource_id, history FROM routes
           WHERE locale = ?1 AND site = ?2 AND slug >= ?3 AND slug < ?4",
        )?;
        let rows = stmt
          .query_map(params![locale, site, lower, upper], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      rows
        .into_iter()
        .filter(|(slug, ..)| stem_suffix(slug, stem).is_some())
        .map(|(slug, key, id, history)| SlugOccupant {
          slug,
          resource: ResourceRef::new(key, id),
          history,
        })
        .collect(),
    )
  }
}
