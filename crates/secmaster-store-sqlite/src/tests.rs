//! Integration tests for `SqliteStore` against an in-memory database.

use std::{
  collections::HashMap,
  io,
  sync::atomic::{AtomicUsize, Ordering},
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use secmaster_core::{
  document::{CompanyFacts, DocumentSource, EntityDocuments},
  entity::{EntityId, EntityState},
  event::{CycleRecord, Event, NewEvent, Scenario, SequenceId},
  extract::DerivedFacts,
  projection::{current_views, entity_view},
  reconcile::Reconciler,
  snapshot::{Malformed, RawListing, Snapshot},
  store::EventLog,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(cycle: i64) -> DateTime<Utc> {
  Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::days(cycle)
}

fn new_event(id: u64, ticker: &str, observed_at: DateTime<Utc>) -> NewEvent {
  NewEvent {
    entity_id:      EntityId(id),
    ticker:         ticker.into(),
    display_name:   format!("{ticker} Inc"),
    scenario:       Scenario::Seed,
    is_active:      true,
    observed_at,
    cycle_id:       Uuid::new_v4(),
    expected_prior: None,
  }
}

fn snapshot(cycle: i64, listings: &[(u64, &str, &str)]) -> Snapshot {
  let mut snap = Snapshot::new(at(cycle));
  for (id, ticker, name) in listings {
    snap.insert(RawListing::new(*id, ticker, name));
  }
  snap
}

// ─── Append / latest ─────────────────────────────────────────────────────────

#[tokio::test]
async fn append_assigns_increasing_sequence_ids() {
  let s = store().await;
  let a = s.append(new_event(1, "AAA", at(0))).await.unwrap();
  let b = s.append(new_event(2, "BBB", at(0))).await.unwrap();
  assert!(b.sequence_id > a.sequence_id);
  assert_eq!(s.event_count().await.unwrap(), 2);
}

#[tokio::test]
async fn latest_of_unseen_entity_is_none() {
  let s = store().await;
  assert!(s.latest(EntityId(42)).await.unwrap().is_none());
  assert!(s.history(EntityId(42)).await.unwrap().is_empty());
}

#[tokio::test]
async fn latest_round_trips_the_appended_event() {
  let s = store().await;
  let mut input = new_event(7, "ABC", Utc::now());
  input.scenario = Scenario::TickerChange { old: "OLD".into(), new: "ABC".into() };

  let appended = s.append(input).await.unwrap();
  let latest = s.latest(EntityId(7)).await.unwrap().unwrap();
  assert_eq!(latest, appended);
}

#[tokio::test]
async fn latest_follows_observation_time_not_append_order() {
  let s = store().await;
  let newer = s.append(new_event(1, "NEW", at(5))).await.unwrap();

  // An older observation appended afterwards is kept in history but does not
  // become the current state.
  let mut older = new_event(1, "OLD", at(1));
  older.expected_prior = Some(newer.sequence_id);
  let older = s.append(older).await.unwrap();
  assert!(older.sequence_id > newer.sequence_id);

  let latest = s.latest(EntityId(1)).await.unwrap().unwrap();
  assert_eq!(latest.ticker, "NEW");

  let history = s.history(EntityId(1)).await.unwrap();
  let tickers: Vec<_> = history.iter().map(|e| e.ticker.as_str()).collect();
  assert_eq!(tickers, ["OLD", "NEW"]);
}

#[tokio::test]
async fn equal_observation_times_break_ties_on_sequence() {
  let s = store().await;
  let first = s.append(new_event(1, "ONE", at(0))).await.unwrap();
  let mut second = new_event(1, "TWO", at(0));
  second.expected_prior = Some(first.sequence_id);
  s.append(second).await.unwrap();

  assert_eq!(s.latest(EntityId(1)).await.unwrap().unwrap().ticker, "TWO");
}

#[tokio::test]
async fn stale_expected_prior_is_rejected_without_writing() {
  let s = store().await;
  let first = s.append(new_event(1, "AAA", at(0))).await.unwrap();

  // Caller believes the entity is unseen.
  let err = s.append(new_event(1, "BBB", at(1))).await.unwrap_err();
  match err {
    Error::StaleAppend { entity_id, expected, found } => {
      assert_eq!(entity_id, EntityId(1));
      assert_eq!(expected, None);
      assert_eq!(found, Some(first.sequence_id));
    }
    other => panic!("unexpected error: {other}"),
  }

  // Caller points at a sequence that is not the latest.
  let mut wrong = new_event(1, "CCC", at(2));
  wrong.expected_prior = Some(SequenceId(first.sequence_id.0 + 100));
  assert!(matches!(s.append(wrong).await, Err(Error::StaleAppend { .. })));

  assert_eq!(s.event_count().await.unwrap(), 1);
  assert_eq!(s.latest(EntityId(1)).await.unwrap().unwrap().ticker, "AAA");
}

#[tokio::test]
async fn current_state_is_one_event_per_entity_in_id_order() {
  let s = store().await;
  s.append(new_event(30, "CCC", at(0))).await.unwrap();
  let a = s.append(new_event(10, "AAA", at(0))).await.unwrap();
  s.append(new_event(20, "BBB", at(0))).await.unwrap();

  let mut rename = new_event(10, "AAB", at(1));
  rename.expected_prior = Some(a.sequence_id);
  s.append(rename).await.unwrap();

  let state = s.current_state().await.unwrap();
  let ids: Vec<_> = state.iter().map(|e| e.entity_id.0).collect();
  assert_eq!(ids, [10, 20, 30]);
  assert_eq!(state[0].ticker, "AAB");
}

#[tokio::test]
async fn entity_ids_above_i64_are_rejected() {
  let s = store().await;
  let result = s.append(new_event(u64::MAX, "BIG", at(0))).await;
  assert!(matches!(result, Err(Error::Core(_))));
}

// ─── Cycles ──────────────────────────────────────────────────────────────────

fn cycle_record(observed_at: DateTime<Utc>) -> CycleRecord {
  CycleRecord {
    cycle_id: Uuid::new_v4(),
    observed_at,
    bootstrap: true,
    started_at: observed_at,
    completed_at: None,
    emitted: 0,
    skipped: 0,
  }
}

#[tokio::test]
async fn started_cycle_is_not_completed_until_marked() {
  let s = store().await;
  let cycle = cycle_record(at(0));
  s.begin_cycle(cycle.clone()).await.unwrap();
  assert!(s.last_completed_cycle().await.unwrap().is_none());

  s.complete_cycle(cycle.cycle_id, at(0) + Duration::minutes(3), 12, 2)
    .await
    .unwrap();
  let done = s.last_completed_cycle().await.unwrap().unwrap();
  assert_eq!(done.cycle_id, cycle.cycle_id);
  assert_eq!(done.completed_at, Some(at(0) + Duration::minutes(3)));
  assert_eq!((done.emitted, done.skipped), (12, 2));
  assert!(done.bootstrap);
}

#[tokio::test]
async fn last_completed_cycle_is_the_most_recent() {
  let s = store().await;
  let first = cycle_record(at(0));
  let second = cycle_record(at(1));
  s.begin_cycle(first.clone()).await.unwrap();
  s.begin_cycle(second.clone()).await.unwrap();
  s.complete_cycle(first.cycle_id, at(0), 0, 0).await.unwrap();
  s.complete_cycle(second.cycle_id, at(1), 0, 0).await.unwrap();

  let done = s.last_completed_cycle().await.unwrap().unwrap();
  assert_eq!(done.cycle_id, second.cycle_id);
}

#[tokio::test]
async fn completing_unknown_cycle_errors() {
  let s = store().await;
  let id = Uuid::new_v4();
  let err = s.complete_cycle(id, at(0), 0, 0).await.unwrap_err();
  assert!(matches!(err, Error::CycleNotFound(missing) if missing == id));
}

// ─── Derived facts ───────────────────────────────────────────────────────────

fn documents_with_revenue(value: f64) -> EntityDocuments {
  let facts: CompanyFacts = serde_json::from_value(json!({
    "entityName": "Acme Co",
    "facts": { "us-gaap": { "Revenues": { "units": { "USD": [
      { "end": "2023-12-31", "val": value, "fp": "FY", "form": "10-K" }
    ]}}}}
  }))
  .unwrap();
  EntityDocuments { facts: Some(facts), submissions: None }
}

#[tokio::test]
async fn derived_facts_are_replaced_on_refresh() {
  let s = store().await;
  let reconciler = Reconciler::new(s.clone());

  let mut source = HashMap::new();
  source.insert(EntityId(1), documents_with_revenue(500.0));
  reconciler.refresh_derived(&source, [EntityId(1)]).await.unwrap();
  let first = s.derived(EntityId(1)).await.unwrap().unwrap();
  assert_eq!(first.revenue.unwrap().value, 500.0);

  source.insert(EntityId(1), documents_with_revenue(750.0));
  reconciler.refresh_derived(&source, [EntityId(1)]).await.unwrap();
  let second = s.derived(EntityId(1)).await.unwrap().unwrap();
  assert_eq!(second.revenue.unwrap().value, 750.0);
}

#[tokio::test]
async fn refresh_counts_entities_without_revenue() {
  let s = store().await;
  let reconciler = Reconciler::new(s.clone());

  let mut source = HashMap::new();
  source.insert(EntityId(1), documents_with_revenue(0.0));

  let report = reconciler
    .refresh_derived(&source, [EntityId(1), EntityId(2)])
    .await
    .unwrap();
  assert_eq!(report.refreshed, 2);
  // A reported zero is still a value.
  assert_eq!(report.with_revenue, 1);
  assert!(report.failed.is_empty());

  let missing = s.derived(EntityId(2)).await.unwrap().unwrap();
  assert!(missing.revenue.is_none());
  assert!(missing.annual_report.is_none());
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn cold_start_seeds_every_listing() {
  let mut r = Reconciler::new(store().await);
  assert!(r.is_bootstrap().await.unwrap());

  let report = r
    .reconcile(&snapshot(0, &[(1, "AAA", "Alpha"), (2, "BBB", "Beta"), (3, "CCC", "Gamma")]))
    .await
    .unwrap();

  assert!(report.bootstrap);
  assert_eq!(report.emitted.len(), 3);
  assert_eq!(report.count(|s| matches!(s, Scenario::Seed)), 3);
  assert_eq!(report.alerts().count(), 0);
  assert!(!r.is_bootstrap().await.unwrap());
}

#[tokio::test]
async fn reconcile_is_idempotent() {
  let mut r = Reconciler::new(store().await);
  let listings = [(1, "AAA", "Alpha"), (2, "BBB", "Beta")];
  r.reconcile(&snapshot(0, &listings)).await.unwrap();

  let again = r.reconcile(&snapshot(1, &listings)).await.unwrap();
  assert!(again.emitted.is_empty());
  assert_eq!(again.unchanged, 2);
  assert_eq!(r.store().event_count().await.unwrap(), 2);
}

#[tokio::test]
async fn new_entity_after_bootstrap_is_a_new_listing() {
  let mut r = Reconciler::new(store().await);
  r.reconcile(&snapshot(0, &[(1, "AAA", "Alpha")])).await.unwrap();

  let report = r
    .reconcile(&snapshot(1, &[(1, "AAA", "Alpha"), (2, "NEW", "Newco")]))
    .await
    .unwrap();
  assert!(!report.bootstrap);
  assert_eq!(report.emitted.len(), 1);
  assert_eq!(report.emitted[0].scenario, Scenario::NewListing);
  assert_eq!(report.emitted[0].entity_id, EntityId(2));
}

#[tokio::test]
async fn interrupted_cold_start_stays_in_bootstrap() {
  let s = store().await;

  // A cycle that began but never completed.
  s.begin_cycle(cycle_record(at(0))).await.unwrap();
  s.append(new_event(1, "AAA", at(0))).await.unwrap();

  let mut r = Reconciler::new(s);
  assert!(r.is_bootstrap().await.unwrap());
  let report = r
    .reconcile(&snapshot(1, &[(1, "AAA", "AAA Inc"), (2, "BBB", "Beta")]))
    .await
    .unwrap();
  assert_eq!(report.emitted.len(), 1);
  assert_eq!(report.emitted[0].scenario, Scenario::Seed);
}

#[tokio::test]
async fn name_change_keeps_ticker() {
  let mut r = Reconciler::new(store().await);
  r.reconcile(&snapshot(0, &[(1, "ABC", "Acme Co")])).await.unwrap();

  let report = r.reconcile(&snapshot(1, &[(1, "ABC", "Acme Corp")])).await.unwrap();
  assert_eq!(
    report.emitted[0].scenario,
    Scenario::NameChange { old: "Acme Co".into(), new: "Acme Corp".into() }
  );
  assert!(!report.emitted[0].scenario.is_alert());
}

#[tokio::test]
async fn full_lifecycle_across_four_cycles() {
  let mut r = Reconciler::new(store().await);
  let id = EntityId(320193);

  r.reconcile(&snapshot(0, &[(320193, "ABC", "Acme Co")])).await.unwrap();
  r.reconcile(&snapshot(1, &[(320193, "XYZ", "Acme Co")])).await.unwrap();
  r.reconcile(&snapshot(2, &[])).await.unwrap();
  r.reconcile(&snapshot(3, &[(320193, "XYZ", "Acme Co")])).await.unwrap();

  let history = r.store().history(id).await.unwrap();
  let scenarios: Vec<_> = history.iter().map(|e| e.scenario.clone()).collect();
  assert_eq!(
    scenarios,
    [
      Scenario::Seed,
      Scenario::TickerChange { old: "ABC".into(), new: "XYZ".into() },
      Scenario::Delisted,
      Scenario::ReListed,
    ]
  );

  // The delisting carries the last known identifiers.
  assert_eq!(history[2].ticker, "XYZ");
  assert!(!history[2].is_active);
  assert!(history[3].is_active);

  let view = entity_view(r.store(), id).await.unwrap().unwrap();
  assert_eq!(view.state, EntityState::Active);
  assert_eq!(view.ticker, "XYZ");
  assert_eq!(view.since, at(3));
}

#[tokio::test]
async fn delisted_entity_is_not_delisted_again() {
  let mut r = Reconciler::new(store().await);
  r.reconcile(&snapshot(0, &[(1, "AAA", "Alpha"), (2, "BBB", "Beta")])).await.unwrap();

  let gone = r.reconcile(&snapshot(1, &[(1, "AAA", "Alpha")])).await.unwrap();
  assert_eq!(gone.count(|s| matches!(s, Scenario::Delisted)), 1);
  assert_eq!(gone.emitted[0].entity_id, EntityId(2));

  let still_gone = r.reconcile(&snapshot(2, &[(1, "AAA", "Alpha")])).await.unwrap();
  assert!(still_gone.emitted.is_empty());
}

#[tokio::test]
async fn malformed_listing_is_skipped_and_not_delisted() {
  let mut r = Reconciler::new(store().await);
  r.reconcile(&snapshot(0, &[(1, "AAA", "Alpha")])).await.unwrap();

  let mut snap = snapshot(1, &[(2, "BBB", "Beta")]);
  snap.insert(RawListing { entity_id: EntityId(1), ticker: None, display_name: Some("Alpha".into()) });
  let report = r.reconcile(&snap).await.unwrap();

  assert_eq!(report.skipped, vec![(EntityId(1), Malformed::MissingTicker)]);
  assert_eq!(report.count(|s| matches!(s, Scenario::Delisted)), 0);
  assert_eq!(report.count(|s| matches!(s, Scenario::NewListing)), 1);

  let latest = r.store().latest(EntityId(1)).await.unwrap().unwrap();
  assert_eq!(latest.scenario, Scenario::Seed);
  assert!(latest.is_active);

  let done = r.store().last_completed_cycle().await.unwrap().unwrap();
  assert_eq!((done.emitted, done.skipped), (1, 1));
}

#[tokio::test]
async fn every_event_of_a_cycle_shares_its_timestamp_and_id() {
  let mut r = Reconciler::new(store().await);
  r.reconcile(&snapshot(0, &[(1, "AAA", "Alpha"), (2, "BBB", "Beta")])).await.unwrap();

  let report = r
    .reconcile(&snapshot(1, &[(1, "AAZ", "Alpha"), (3, "CCC", "Gamma")]))
    .await
    .unwrap();
  assert_eq!(report.emitted.len(), 3);
  assert!(report.emitted.iter().all(|e| e.observed_at == at(1)));
  assert!(report.emitted.iter().all(|e| e.cycle_id == report.cycle_id));
}

#[tokio::test]
async fn current_views_hide_inactive_entities_by_default() {
  let mut r = Reconciler::new(store().await);
  r.reconcile(&snapshot(0, &[(1, "AAA", "Alpha"), (2, "BBB", "Beta")])).await.unwrap();
  r.reconcile(&snapshot(1, &[(1, "AAA", "Alpha")])).await.unwrap();

  let active = current_views(r.store(), false).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].entity_id, EntityId(1));

  let all = current_views(r.store(), true).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[1].state, EntityState::Inactive);
  assert_eq!(all[1].last_scenario, Scenario::Delisted);
}

#[tokio::test]
async fn run_cycle_refreshes_only_well_formed_listings() {
  let mut r = Reconciler::new(store().await);

  let mut source = HashMap::new();
  source.insert(EntityId(1), documents_with_revenue(1_000.0));

  let mut snap = snapshot(0, &[(1, "AAA", "Alpha")]);
  snap.insert(RawListing { entity_id: EntityId(2), ticker: Some("BBB".into()), display_name: None });

  let (cycle, refresh) = r.run_cycle(&snap, &source).await.unwrap();
  assert_eq!(cycle.emitted.len(), 1);
  assert_eq!(refresh.refreshed, 1);

  let view = entity_view(r.store(), EntityId(1)).await.unwrap().unwrap();
  assert_eq!(view.revenue(), Some(1_000.0));
  assert!(r.store().derived(EntityId(2)).await.unwrap().is_none());
}

// ─── Failures ────────────────────────────────────────────────────────────────

/// Delegates to a [`SqliteStore`] but fails every append after the first
/// `budget`, as if the connection had dropped.
struct FailingAppends {
  inner:  SqliteStore,
  budget: AtomicUsize,
}

impl FailingAppends {
  fn new(inner: SqliteStore, budget: usize) -> Self {
    Self { inner, budget: AtomicUsize::new(budget) }
  }
}

impl EventLog for FailingAppends {
  type Error = Error;

  async fn latest(&self, id: EntityId) -> Result<Option<Event>, Error> {
    self.inner.latest(id).await
  }

  async fn append(&self, event: NewEvent) -> Result<Event, Error> {
    let left = self.budget.load(Ordering::SeqCst);
    if left == 0 {
      return Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed));
    }
    self.budget.store(left - 1, Ordering::SeqCst);
    self.inner.append(event).await
  }

  async fn current_state(&self) -> Result<Vec<Event>, Error> { self.inner.current_state().await }

  async fn history(&self, id: EntityId) -> Result<Vec<Event>, Error> {
    self.inner.history(id).await
  }

  async fn begin_cycle(&self, cycle: CycleRecord) -> Result<(), Error> {
    self.inner.begin_cycle(cycle).await
  }

  async fn complete_cycle(
    &self,
    cycle_id: Uuid,
    completed_at: DateTime<Utc>,
    emitted: u64,
    skipped: u64,
  ) -> Result<(), Error> {
    self.inner.complete_cycle(cycle_id, completed_at, emitted, skipped).await
  }

  async fn last_completed_cycle(&self) -> Result<Option<CycleRecord>, Error> {
    self.inner.last_completed_cycle().await
  }

  async fn record_derived(&self, id: EntityId, facts: DerivedFacts) -> Result<(), Error> {
    self.inner.record_derived(id, facts).await
  }

  async fn derived(&self, id: EntityId) -> Result<Option<DerivedFacts>, Error> {
    self.inner.derived(id).await
  }
}

/// Serves documents from a map, except for `down`, which always time out.
struct PartlyDown {
  documents: HashMap<EntityId, EntityDocuments>,
  down:      Vec<EntityId>,
}

impl DocumentSource for PartlyDown {
  type Error = io::Error;

  async fn documents(&self, id: EntityId) -> Result<EntityDocuments, io::Error> {
    if self.down.contains(&id) {
      return Err(io::Error::new(io::ErrorKind::TimedOut, "upstream timed out"));
    }
    Ok(self.documents.get(&id).cloned().unwrap_or_default())
  }
}

#[tokio::test]
async fn store_failure_aborts_cycle_and_next_cycle_resumes() {
  let s = store().await;
  let listings = [(1, "AAA", "Alpha"), (2, "BBB", "Beta"), (3, "CCC", "Gamma"), (4, "DDD", "Delta")];

  let mut flaky = Reconciler::new(FailingAppends::new(s.clone(), 2));
  let err = flaky.reconcile(&snapshot(0, &listings)).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));

  // What was appended before the failure stays; the cycle never completes.
  assert_eq!(s.event_count().await.unwrap(), 2);
  assert!(s.last_completed_cycle().await.unwrap().is_none());

  let mut r = Reconciler::new(s.clone());
  assert!(r.is_bootstrap().await.unwrap());
  let resumed = r.reconcile(&snapshot(1, &listings)).await.unwrap();
  assert_eq!(resumed.emitted.len(), 2);
  assert_eq!(resumed.count(|s| matches!(s, Scenario::Seed)), 2);
  assert_eq!(resumed.unchanged, 2);

  assert_eq!(s.event_count().await.unwrap(), 4);
  for (id, ..) in listings {
    assert_eq!(s.history(EntityId(id)).await.unwrap().len(), 1);
  }
  assert!(s.last_completed_cycle().await.unwrap().is_some());
}

#[tokio::test]
async fn fetch_failure_keeps_previous_derived_facts() {
  let s = store().await;
  let reconciler = Reconciler::new(s.clone());

  let mut earlier = HashMap::new();
  earlier.insert(EntityId(1), documents_with_revenue(500.0));
  reconciler.refresh_derived(&earlier, [EntityId(1)]).await.unwrap();

  let mut documents = HashMap::new();
  documents.insert(EntityId(2), documents_with_revenue(80.0));
  let source = PartlyDown { documents, down: vec![EntityId(1)] };

  let report = reconciler
    .refresh_derived(&source, [EntityId(1), EntityId(2)])
    .await
    .unwrap();
  assert_eq!(report.failed, vec![EntityId(1)]);
  assert_eq!(report.refreshed, 1);
  assert_eq!(report.with_revenue, 1);

  let kept = s.derived(EntityId(1)).await.unwrap().unwrap();
  assert_eq!(kept.revenue.unwrap().value, 500.0);
  let fresh = s.derived(EntityId(2)).await.unwrap().unwrap();
  assert_eq!(fresh.revenue.unwrap().value, 80.0);
}
