//! Engine tests against the in-memory store.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use uuid::Uuid;

use crate::{
  Error, Result,
  cascade::{CascadeConfig, RouteChangeCascade, SlugSource},
  manager::RouteManager,
  memory::MemoryRouteStore,
  route::{
    DescendantCursor, NewRoute, ResourceRef, Resolution, Route, Scope, SlugLookup, SlugOccupant,
  },
  slug,
  store::RouteStore,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Wraps the memory store to inject commit failures and latency.
#[derive(Default)]
struct FlakyStore {
  inner:           MemoryRouteStore,
  flushes:         AtomicUsize,
  /// 1-based index of the commit that fails; 0 disables.
  fail_flush_at:   AtomicUsize,
  flush_delay_ms:  AtomicUsize,
  /// Delay after the next `find_one_by` returns; used once, then reset.
  lookup_delay_ms: AtomicUsize,
}

impl RouteStore for FlakyStore {
  type Error = Error;

  async fn add(&self, input: NewRoute) -> Result<Route> { self.inner.add(input).await }

  async fn remove(&self, id: Uuid) -> Result<bool> { self.inner.remove(id).await }

  async fn remove_all_for_resource(&self, resource: &ResourceRef) -> Result<usize> {
    self.inner.remove_all_for_resource(resource).await
  }

  async fn commit(&self, batch: Vec<Route>) -> Result<usize> {
    let delay = self.flush_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    let n = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
    if n == self.fail_flush_at.load(Ordering::SeqCst) {
      return Err(Error::Store("connection reset".into()));
    }
    self.inner.commit(batch).await
  }

  async fn get(&self, id: Uuid) -> Result<Option<Route>> { self.inner.get(id).await }

  async fn find_one_by(&self, resource: &ResourceRef, scope: &Scope) -> Result<Option<Route>> {
    let found = self.inner.find_one_by(resource, scope).await;
    let delay = self.lookup_delay_ms.swap(0, Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay as u64)).await;
    }
    found
  }

  async fn find_by_slug(&self, slug: &str, scope: &Scope) -> Result<SlugLookup> {
    self.inner.find_by_slug(slug, scope).await
  }

  async fn find_children(&self, parent: Uuid) -> Result<Vec<Route>> {
    self.inner.find_children(parent).await
  }

  async fn find_history(&self, target: Uuid) -> Result<Vec<Route>> {
    self.inner.find_history(target).await
  }

  async fn descendants_page(
    &self,
    root: &str,
    scope: &Scope,
    after: Option<&DescendantCursor>,
    limit: usize,
  ) -> Result<Vec<Route>> {
    self.inner.descendants_page(root, scope, after, limit).await
  }

  async fn slugs_with_stem(&self, stem: &str, scope: &Scope) -> Result<Vec<SlugOccupant>> {
    self.inner.slugs_with_stem(stem, scope).await
  }
}

fn en() -> Scope { Scope::new("en", None) }

fn page(id: &str) -> ResourceRef { ResourceRef::new("page", id) }

fn manager() -> RouteManager<MemoryRouteStore> {
  RouteManager::new(Arc::new(MemoryRouteStore::new()), CascadeConfig::default())
}

fn manager_with(config: CascadeConfig) -> RouteManager<FlakyStore> {
  RouteManager::new(Arc::new(FlakyStore::default()), config)
}

/// `/test`, `/test/child-a`, `/test/child-b`, `/test/child-b/grand-child-a`
/// plus two unrelated roots.
async fn seed<S: RouteStore>(m: &RouteManager<S>) {
  for (id, path) in [
    ("test", "/test"),
    ("child-a", "/test/child-a"),
    ("child-b", "/test/child-b"),
    ("grand-child-a", "/test/child-b/grand-child-a"),
    ("independent-1", "/independent-route-1"),
    ("independent-2", "/independent-route-2"),
  ] {
    m.create(page(id), en(), path).await.unwrap();
  }
}

async fn slug_of<S: RouteStore>(m: &RouteManager<S>, id: &str) -> String {
  m.route_for(&page(id), &en()).await.unwrap().slug
}

fn assert_invariants(routes: &[Route]) {
  let by_id: HashMap<Uuid, &Route> = routes.iter().map(|r| (r.id, r)).collect();
  let mut live_slugs = HashSet::new();
  let mut live_owners = HashSet::new();

  for r in routes.iter().filter(|r| !r.history) {
    assert!(
      live_slugs.insert((r.locale.clone(), r.site.clone(), r.slug.clone())),
      "duplicate live slug {}",
      r.slug
    );
    assert!(
      live_owners.insert((r.resource(), r.scope())),
      "{} has two live routes",
      r.resource()
    );
    if let Some(parent_id) = r.parent_id {
      let parent = by_id[&parent_id];
      assert!(!parent.history, "{} has a history parent", r.slug);
      assert!(
        slug::is_within(&r.slug, &parent.slug),
        "{} is not below its parent {}",
        r.slug,
        parent.slug
      );
    }
  }

  for h in routes.iter().filter(|r| r.history) {
    let target = by_id[&h.target_id.expect("history without target")];
    assert!(!target.history, "history {} points at history", h.slug);
  }
}

// ─── Subtree rewrite ─────────────────────────────────────────────────────────

#[tokio::test]
async fn rename_rewrites_whole_subtree() {
  let m = manager();
  seed(&m).await;

  let report = m
    .on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap();

  assert_eq!(report.old_slug, "/test");
  assert_eq!(report.new_slug, "/test-article");
  assert_eq!(report.rewritten, 3);
  assert_eq!(report.history_created, 4);

  assert_eq!(slug_of(&m, "test").await, "/test-article");
  assert_eq!(slug_of(&m, "child-a").await, "/test-article/child-a");
  assert_eq!(slug_of(&m, "child-b").await, "/test-article/child-b");
  assert_eq!(
    slug_of(&m, "grand-child-a").await,
    "/test-article/child-b/grand-child-a"
  );

  for (old, new) in [
    ("/test", "/test-article"),
    ("/test/child-a", "/test-article/child-a"),
    ("/test/child-b", "/test-article/child-b"),
    ("/test/child-b/grand-child-a", "/test-article/child-b/grand-child-a"),
  ] {
    match m.resolve_path(old, &en()).await.unwrap() {
      Resolution::Redirect { to, .. } => assert_eq!(to, new),
      other => panic!("{old} resolved to {other:?}"),
    }
  }

  let routes = m.store().all_routes();
  assert_eq!(routes.iter().filter(|r| r.history).count(), 4);
  assert_invariants(&routes);
}

#[tokio::test]
async fn rename_leaves_independent_routes_alone() {
  let m = manager();
  seed(&m).await;
  let before = m.route_for(&page("independent-1"), &en()).await.unwrap();

  m.on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap();

  let after = m.route_for(&page("independent-1"), &en()).await.unwrap();
  assert_eq!(before, after);
  assert_eq!(slug_of(&m, "independent-2").await, "/independent-route-2");
}

#[tokio::test]
async fn rename_does_not_touch_prefix_lookalikes() {
  let m = manager();
  m.create(page("test"), en(), "/test").await.unwrap();
  m.create(page("testing"), en(), "/testing").await.unwrap();
  m.create(page("testing-child"), en(), "/testing/child").await.unwrap();

  let report = m
    .on_slug_change(&page("test"), &en(), "/exam", SlugSource::UserInput)
    .await
    .unwrap();

  assert_eq!(report.rewritten, 0);
  assert_eq!(slug_of(&m, "testing-child").await, "/testing/child");
}

#[tokio::test]
async fn other_scopes_are_untouched() {
  let m = manager();
  let de = Scope::new("de", None);
  let blog = Scope::new("en", Some("blog"));
  m.create(page("test"), en(), "/test").await.unwrap();
  m.create(page("child"), en(), "/test/child").await.unwrap();
  m.create(page("test"), de.clone(), "/test").await.unwrap();
  m.create(page("child"), de.clone(), "/test/child").await.unwrap();
  m.create(page("x"), blog.clone(), "/test/child").await.unwrap();

  m.on_slug_change(&page("test"), &en(), "/renamed", SlugSource::UserInput)
    .await
    .unwrap();

  assert_eq!(slug_of(&m, "child").await, "/renamed/child");
  assert_eq!(m.route_for(&page("child"), &de).await.unwrap().slug, "/test/child");
  assert_eq!(m.route_for(&page("x"), &blog).await.unwrap().slug, "/test/child");
}

// ─── Idempotence & history ───────────────────────────────────────────────────

#[tokio::test]
async fn repeating_a_change_is_a_no_op() {
  let m = manager();
  seed(&m).await;

  m.on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap();
  let once = m.store().all_routes();

  let report = m
    .on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap();
  assert!(!report.changed());
  assert_eq!(report.rewritten, 0);
  assert_eq!(m.store().all_routes(), once);
}

#[tokio::test]
async fn history_collapses_to_final_route() {
  let m = manager();
  m.create(page("a"), en(), "/a").await.unwrap();
  m.create(page("a-child"), en(), "/a/x").await.unwrap();

  m.on_slug_change(&page("a"), &en(), "/b", SlugSource::UserInput).await.unwrap();
  m.on_slug_change(&page("a"), &en(), "/c", SlugSource::UserInput).await.unwrap();

  for old in ["/a", "/b"] {
    match m.resolve_path(old, &en()).await.unwrap() {
      Resolution::Redirect { to, .. } => assert_eq!(to, "/c"),
      other => panic!("{old} resolved to {other:?}"),
    }
  }
  match m.store().find_by_slug("/a/x", &en()).await.unwrap() {
    SlugLookup::History { route, target: Some(target) } => {
      assert_eq!(target.slug, "/c/x");
      assert_eq!(route.target_id, Some(target.id));
    }
    other => panic!("unexpected {other:?}"),
  }
  assert_invariants(&m.store().all_routes());
}

#[tokio::test]
async fn renaming_back_reclaims_own_history() {
  let m = manager();
  m.create(page("a"), en(), "/a").await.unwrap();
  m.create(page("a-child"), en(), "/a/x").await.unwrap();

  m.on_slug_change(&page("a"), &en(), "/b", SlugSource::UserInput).await.unwrap();
  let report = m
    .on_slug_change(&page("a"), &en(), "/a", SlugSource::UserInput)
    .await
    .unwrap();

  assert_eq!(report.new_slug, "/a");
  assert_eq!(slug_of(&m, "a-child").await, "/a/x");
  assert!(matches!(
    m.resolve_path("/a/x", &en()).await.unwrap(),
    Resolution::Direct { .. }
  ));
  assert!(matches!(
    m.resolve_path("/b/x", &en()).await.unwrap(),
    Resolution::Redirect { ref to, .. } if to == "/a/x"
  ));
  assert_invariants(&m.store().all_routes());
}

// ─── Resolver ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn suffix_search_picks_smallest_free() {
  let m = manager();
  m.create(page("1"), en(), "/rezepte").await.unwrap();
  m.create(page("2"), en(), "/rezepte-1").await.unwrap();

  let resolved = m.resolver().resolve("/rezepte", &en()).await.unwrap();
  assert_eq!(resolved, "/rezepte-2");

  m.create(page("4"), en(), "/rezepte-3").await.unwrap();
  let created = m.create(page("3"), en(), "/Rezepte").await.unwrap();
  assert_eq!(created.slug, "/rezepte-2");
  let created = m.create(page("5"), en(), "/rezepte").await.unwrap();
  assert_eq!(created.slug, "/rezepte-4");
}

#[tokio::test]
async fn suffix_applies_to_last_segment_only() {
  let m = manager();
  m.create(page("news"), en(), "/news").await.unwrap();
  m.create(page("first"), en(), "/news/hello").await.unwrap();

  let second = m.create(page("second"), en(), "/news/Hello!").await.unwrap();
  assert_eq!(second.slug, "/news/hello-1");
  assert_eq!(second.parent_id, Some(m.route_for(&page("news"), &en()).await.unwrap().id));
}

#[tokio::test]
async fn foreign_history_counts_as_taken() {
  let m = manager();
  m.create(page("old"), en(), "/offers").await.unwrap();
  m.on_slug_change(&page("old"), &en(), "/deals", SlugSource::UserInput)
    .await
    .unwrap();

  let fresh = m.create(page("new"), en(), "/offers").await.unwrap();
  assert_eq!(fresh.slug, "/offers-1");

  // ...but the owner may take its own history back.
  let report = m
    .on_slug_change(&page("old"), &en(), "/offers", SlugSource::UserInput)
    .await
    .unwrap();
  assert_eq!(report.new_slug, "/offers");
}

#[tokio::test]
async fn is_valid_checks_form_and_availability() {
  let m = manager();
  m.create(page("a"), en(), "/a").await.unwrap();

  assert!(m.resolver().is_valid("/b", &en()).await.unwrap());
  assert!(!m.resolver().is_valid("/a", &en()).await.unwrap());
  assert!(!m.resolver().is_valid("/b/", &en()).await.unwrap());
  assert!(!m.resolver().is_valid("b", &en()).await.unwrap());
}

#[tokio::test]
async fn child_slug_without_parent_sits_under_root() {
  let m = manager();
  let s = m
    .resolver()
    .child_slug(None, "Über uns", &Scope::new("de", None), None)
    .await
    .unwrap();
  assert_eq!(s, "/ueber-uns");
}

// ─── Failure handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_slug_aborts_before_any_write() {
  let m = manager();
  seed(&m).await;
  let before = m.store().all_routes();

  let err = m
    .on_slug_change(&page("test"), &en(), "/bad slug/", SlugSource::Validated)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidSlug { .. }));

  let err = m
    .on_slug_change(&page("test"), &en(), "/!!!", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidSlug { .. }));

  assert_eq!(m.store().all_routes(), before);
}

#[tokio::test]
async fn validated_slug_is_used_verbatim_unless_taken() {
  let m = manager();
  seed(&m).await;
  let before = m.store().all_routes();

  let err = m
    .on_slug_change(&page("test"), &en(), "/independent-route-1", SlugSource::Validated)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateSlug { .. }));
  assert_eq!(m.store().all_routes(), before);

  let report = m
    .on_slug_change(&page("test"), &en(), "/Test_Article", SlugSource::Validated)
    .await
    .unwrap();
  assert_eq!(report.new_slug, "/Test_Article");
  assert_eq!(slug_of(&m, "child-a").await, "/Test_Article/child-a");
}

#[tokio::test]
async fn moving_below_itself_is_rejected() {
  let m = manager();
  seed(&m).await;

  let err = m
    .on_slug_change(&page("test"), &en(), "/test/inner", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidSlug { .. }));
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
  let m = manager();
  let err = m
    .on_slug_change(&page("nope"), &en(), "/x", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn overlapping_cascade_is_refused() {
  let m = manager();
  seed(&m).await;

  let _held = m.cascade().locks().try_lock(&en(), &["/test/child-b"]).unwrap();
  let err = m
    .on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ConcurrentCascade { .. }));
  assert_eq!(slug_of(&m, "test").await, "/test");

  // A disjoint subtree is not blocked.
  m.on_slug_change(&page("independent-1"), &en(), "/solo", SlugSource::UserInput)
    .await
    .unwrap();
}

#[tokio::test]
async fn partial_flush_failure_is_resumable() {
  let m = manager_with(CascadeConfig { batch_size: 2, page_size: 10, ..Default::default() });
  m.create(page("root"), en(), "/test").await.unwrap();
  for i in 0..5 {
    m.create(page(&format!("c{i}")), en(), &format!("/test/c{i}")).await.unwrap();
  }
  m.store().fail_flush_at.store(2, Ordering::SeqCst);

  let err = m
    .on_slug_change(&page("root"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap_err();
  match err {
    Error::CascadeAborted { flushed, .. } => assert_eq!(flushed, 2),
    other => panic!("unexpected {other}"),
  }

  // First batch is durable; the rest and the root are not.
  assert_eq!(slug_of(&m, "c0").await, "/test-article/c0");
  assert_eq!(slug_of(&m, "c1").await, "/test-article/c1");
  for i in 2..5 {
    assert_eq!(slug_of(&m, &format!("c{i}")).await, format!("/test/c{i}"));
  }
  assert_eq!(slug_of(&m, "root").await, "/test");
  assert_eq!(m.cascade().locks().held(), 0);

  let report = m
    .on_slug_change(&page("root"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap();
  assert_eq!(report.rewritten, 3);

  assert_eq!(slug_of(&m, "root").await, "/test-article");
  for i in 0..5 {
    assert_eq!(slug_of(&m, &format!("c{i}")).await, format!("/test-article/c{i}"));
    assert!(matches!(
      m.resolve_path(&format!("/test/c{i}"), &en()).await.unwrap(),
      Resolution::Redirect { .. }
    ));
  }
  let routes = m.store().inner.all_routes();
  assert_eq!(routes.iter().filter(|r| r.history).count(), 6);
  assert_invariants(&routes);
}

#[tokio::test]
async fn slow_cascade_times_out_between_batches() {
  let m = manager_with(CascadeConfig { batch_size: 1, timeout_ms: 20, ..Default::default() });
  m.create(page("root"), en(), "/test").await.unwrap();
  m.create(page("c0"), en(), "/test/c0").await.unwrap();
  m.create(page("c1"), en(), "/test/c1").await.unwrap();
  m.store().flush_delay_ms.store(50, Ordering::SeqCst);

  // The first commit starts in time and outlives the budget; it still lands.
  let err = m
    .on_slug_change(&page("root"), &en(), "/elsewhere", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::CascadeTimeout { flushed: 1, .. }));
  assert_eq!(slug_of(&m, "c0").await, "/elsewhere/c0");
  assert_eq!(slug_of(&m, "c1").await, "/test/c1");
  assert_eq!(slug_of(&m, "root").await, "/test");
  assert_eq!(m.cascade().locks().held(), 0);

  m.store().flush_delay_ms.store(0, Ordering::SeqCst);
  let report = m
    .on_slug_change(&page("root"), &en(), "/elsewhere", SlugSource::UserInput)
    .await
    .unwrap();
  assert_eq!(report.rewritten, 1);
  assert_eq!(slug_of(&m, "c1").await, "/elsewhere/c1");
  assert_invariants(&m.store().inner.all_routes());
}

#[tokio::test]
async fn commit_started_in_time_is_not_cancelled() {
  let m = manager_with(CascadeConfig { timeout_ms: 20, ..Default::default() });
  m.create(page("root"), en(), "/test").await.unwrap();
  m.create(page("child"), en(), "/test/child").await.unwrap();
  m.store().flush_delay_ms.store(100, Ordering::SeqCst);

  let report = m
    .on_slug_change(&page("root"), &en(), "/elsewhere", SlugSource::UserInput)
    .await
    .unwrap();
  assert_eq!(report.batches, 1);
  assert_eq!(slug_of(&m, "root").await, "/elsewhere");
  assert_eq!(slug_of(&m, "child").await, "/elsewhere/child");
}

#[tokio::test]
async fn exhausted_budget_writes_nothing() {
  let m = manager_with(CascadeConfig { timeout_ms: 0, ..Default::default() });
  seed(&m).await;
  let before = m.store().inner.all_routes();

  let err = m
    .on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::CascadeTimeout { flushed: 0, .. }));
  assert_eq!(m.store().inner.all_routes(), before);
  assert_eq!(m.store().flushes.load(Ordering::SeqCst), 0);
}

// ─── Interleaving ────────────────────────────────────────────────────────────

#[tokio::test]
async fn route_moved_before_lock_is_refused() {
  let m = manager_with(CascadeConfig::default());
  seed(&m).await;

  // The first cascade reads `/test`, then stalls while the second one
  // moves the whole subtree to `/x` and releases its lock.
  let (test, scope) = (page("test"), en());
  m.store().lookup_delay_ms.store(100, Ordering::SeqCst);
  let (late, early) = tokio::join!(
    m.on_slug_change(&test, &scope, "/y", SlugSource::UserInput),
    m.on_slug_change(&test, &scope, "/x", SlugSource::UserInput),
  );
  assert_eq!(early.unwrap().new_slug, "/x");
  assert!(matches!(late, Err(Error::ConcurrentCascade { .. })));

  assert_eq!(slug_of(&m, "test").await, "/x");
  assert_eq!(slug_of(&m, "grand-child-a").await, "/x/child-b/grand-child-a");
  assert!(matches!(
    m.resolve_path("/x", &en()).await.unwrap(),
    Resolution::Direct { .. }
  ));
  assert_invariants(&m.store().inner.all_routes());

  // Retried against the current state, the change goes through.
  let report = m
    .on_slug_change(&page("test"), &en(), "/y", SlugSource::UserInput)
    .await
    .unwrap();
  assert_eq!(report.old_slug, "/x");
  assert_eq!(report.rewritten, 3);
  assert_eq!(slug_of(&m, "child-a").await, "/y/child-a");
  match m.resolve_path("/test/child-a", &en()).await.unwrap() {
    Resolution::Redirect { to, .. } => assert_eq!(to, "/y/child-a"),
    other => panic!("unexpected {other:?}"),
  }
  assert_invariants(&m.store().inner.all_routes());
}

#[tokio::test]
async fn create_inside_running_cascade_is_refused() {
  let m = manager_with(CascadeConfig { batch_size: 1, ..Default::default() });
  seed(&m).await;
  m.store().flush_delay_ms.store(30, Ordering::SeqCst);

  let (test, scope) = (page("test"), en());
  let (cascade, created) = tokio::join!(
    m.on_slug_change(&test, &scope, "/test-article", SlugSource::UserInput),
    async {
      while m.cascade().locks().held() == 0 {
        tokio::task::yield_now().await;
      }
      let child = m.create_child(page("late"), en(), Some(&page("test")), "Late").await;
      let nested = m.create(page("nested"), en(), "/test/child-b/nested").await;
      let elsewhere = m.create(page("elsewhere"), en(), "/elsewhere").await;
      (child, nested, elsewhere)
    },
  );
  cascade.unwrap();
  let (child, nested, elsewhere) = created;
  assert!(matches!(child, Err(Error::ConcurrentCascade { .. })));
  assert!(matches!(nested, Err(Error::ConcurrentCascade { .. })));
  assert_eq!(elsewhere.unwrap().slug, "/elsewhere");
  assert_eq!(m.cascade().locks().held(), 0);

  m.store().flush_delay_ms.store(0, Ordering::SeqCst);
  let late = m
    .create_child(page("late"), en(), Some(&page("test")), "Late")
    .await
    .unwrap();
  assert_eq!(late.slug, "/test-article/late");
  assert_invariants(&m.store().inner.all_routes());
}

// ─── Batching ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn large_subtree_is_rewritten_in_batches() {
  let m = RouteManager::new(
    Arc::new(MemoryRouteStore::new()),
    CascadeConfig { batch_size: 7, page_size: 5, ..Default::default() },
  );
  m.create(page("root"), en(), "/shop").await.unwrap();
  for i in 0..20 {
    let cat = format!("cat-{i}");
    m.create(page(&cat), en(), &format!("/shop/{cat}")).await.unwrap();
    for j in 0..3 {
      m.create(page(&format!("{cat}-{j}")), en(), &format!("/shop/{cat}/item-{j}"))
        .await
        .unwrap();
    }
  }

  let report = m
    .on_slug_change(&page("root"), &en(), "/store", SlugSource::UserInput)
    .await
    .unwrap();

  assert_eq!(report.rewritten, 80);
  // 80 descendants in batches of 7, plus the final batch with the root.
  assert_eq!(report.batches, 12);
  assert_eq!(slug_of(&m, "cat-13-2").await, "/store/cat-13/item-2");
  assert_invariants(&m.store().all_routes());
}

#[tokio::test]
async fn descendants_come_parents_first() {
  let m = manager();
  seed(&m).await;

  let mut walk = crate::store::Descendants::new(&**m.store(), "/test", en(), 2);
  let mut seen = Vec::new();
  loop {
    let page = walk.next_page().await.unwrap();
    if page.is_empty() {
      break;
    }
    seen.extend(page.into_iter().map(|r| r.slug));
  }
  assert_eq!(
    seen,
    ["/test/child-a", "/test/child-b", "/test/child-b/grand-child-a"]
  );

  // A walk restarted from a saved cursor picks up where it stopped.
  let mut first = crate::store::Descendants::new(&**m.store(), "/test", en(), 1);
  first.next_page().await.unwrap();
  let cursor = first.cursor().cloned();
  let mut resumed = crate::store::Descendants::new(&**m.store(), "/test", en(), 10)
    .resume_from(cursor);
  let rest: Vec<_> = resumed.next_page().await.unwrap().into_iter().map(|r| r.slug).collect();
  assert_eq!(rest, ["/test/child-b", "/test/child-b/grand-child-a"]);
}

#[tokio::test]
async fn failed_commit_leaves_no_partial_batch() {
  let m = manager();
  m.create(page("a"), en(), "/a").await.unwrap();
  m.create(page("b"), en(), "/b").await.unwrap();
  let before = m.store().all_routes();

  let mut a = m.route_for(&page("a"), &en()).await.unwrap();
  let mut b = m.route_for(&page("b"), &en()).await.unwrap();
  a.slug = "/c".into();
  b.slug = "/c".into();

  let mut session = m.store().session();
  session.save(a).unwrap();
  session.save(b).unwrap();
  assert_eq!(session.staged(), 2);

  let err = session.flush().await.unwrap_err();
  assert!(matches!(err, Error::DuplicateSlug { .. }));
  assert_eq!(session.staged(), 0);
  assert_eq!(m.store().all_routes(), before);
}

#[tokio::test]
async fn dropped_session_commits_nothing() {
  let m = manager();
  let a = m.create(page("a"), en(), "/a").await.unwrap();

  let mut session = m.store().session();
  session.save(a.retire("/old-a")).unwrap();
  assert!(session.save(Route { slug: "no-slash".into(), ..a.clone() }).is_err());
  drop(session);
  assert_eq!(m.store().len(), 1);

  let mut session = m.store().session();
  session.save(a.retire("/old-a")).unwrap();
  session.discard();
  assert_eq!(session.flush().await.unwrap(), 0);
  assert_eq!(m.store().len(), 1);
}

#[tokio::test]
async fn cascades_sharing_locks_exclude_each_other() {
  let m = manager();
  seed(&m).await;
  let other = RouteChangeCascade::new(Arc::clone(m.store()), CascadeConfig::default())
    .with_locks(m.cascade().locks().clone());

  let _held = m.cascade().locks().try_lock(&en(), &["/test"]).unwrap();
  let err = other
    .on_slug_change(&page("child-a"), &en(), "/moved", SlugSource::UserInput)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ConcurrentCascade { .. }));

  // A cascade with its own registry does not see the lock.
  let loner = RouteChangeCascade::new(Arc::clone(m.store()), CascadeConfig::default());
  loner
    .on_slug_change(&page("child-b"), &en(), "/solo", SlugSource::UserInput)
    .await
    .unwrap();
}

// ─── Creation, moves, removal ────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_slug_is_reported_by_add() {
  let m = manager();
  m.create(page("a"), en(), "/a").await.unwrap();

  let err = m
    .store()
    .add(NewRoute { resource: page("b"), scope: en(), slug: "/a".into(), parent_id: None })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateSlug { .. }));

  let err = m.create(page("a"), en(), "/other").await.unwrap_err();
  assert!(matches!(err, Error::DuplicateRoute { .. }));
}

#[tokio::test]
async fn create_child_links_parent() {
  let m = manager();
  let root = m.create_child(page("root"), en(), None, "Blog").await.unwrap();
  let post = m
    .create_child(page("post"), en(), Some(&page("root")), "Hello, World")
    .await
    .unwrap();

  assert_eq!(root.slug, "/blog");
  assert_eq!(post.slug, "/blog/hello-world");
  assert_eq!(post.parent_id, Some(root.id));

  let children = m.store().find_children(root.id).await.unwrap();
  assert_eq!(children.len(), 1);
  assert_eq!(children[0].id, post.id);
}

#[tokio::test]
async fn move_under_relinks_parent() {
  let m = manager();
  seed(&m).await;

  let report = m
    .move_under(&page("child-b"), &en(), Some(&page("independent-1")))
    .await
    .unwrap();
  assert_eq!(report.new_slug, "/independent-route-1/child-b");
  assert_eq!(
    slug_of(&m, "grand-child-a").await,
    "/independent-route-1/child-b/grand-child-a"
  );

  let moved = m.route_for(&page("child-b"), &en()).await.unwrap();
  let new_parent = m.route_for(&page("independent-1"), &en()).await.unwrap();
  assert_eq!(moved.parent_id, Some(new_parent.id));
  assert_invariants(&m.store().all_routes());
}

#[tokio::test]
async fn removing_a_resource_drops_its_history() {
  let m = manager();
  seed(&m).await;
  m.on_slug_change(&page("test"), &en(), "/test-article", SlugSource::UserInput)
    .await
    .unwrap();
  m.create(page("test"), Scope::new("de", None), "/test").await.unwrap();

  let removed = m.remove_resource(&page("test")).await.unwrap();
  // Live + history in `en`, live in `de`.
  assert_eq!(removed, 3);
  assert!(matches!(
    m.resolve_path("/test", &en()).await.unwrap(),
    Resolution::NotFound
  ));

  let child = m.route_for(&page("child-a"), &en()).await.unwrap();
  assert_eq!(child.parent_id, None);
  assert_eq!(m.store().find_history(child.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_path_ignores_trailing_slash() {
  let m = manager();
  m.create(page("a"), en(), "/a").await.unwrap();

  assert!(matches!(
    m.resolve_path("/a/", &en()).await.unwrap(),
    Resolution::Direct { ref route } if route.resource_id == "a"
  ));
  assert!(matches!(
    m.resolve_path("/missing", &en()).await.unwrap(),
    Resolution::NotFound
  ));
}
