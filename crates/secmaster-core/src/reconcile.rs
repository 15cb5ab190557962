//! The reconciliation state machine.
//!
//! A cycle compares one [`Snapshot`] against the event log, one entity at a
//! time, and appends an event for every observed change:
//!
//! | prior    | condition                 | scenario                          |
//! |----------|---------------------------|-----------------------------------|
//! | unseen   |                           | `NewListing` (`Seed` on bootstrap) |
//! | active   | ticker differs            | `TickerChange`                    |
//! | active   | same ticker, name differs | `NameChange`                      |
//! | active   | nothing differs           | none                              |
//! | inactive | reappears                 | `ReListed`                        |
//!
//! After the per-entity loop, every entity that was active before the cycle
//! and is absent from the snapshot receives a `Delisted` event.
//!
//! A malformed listing is skipped without touching the entity. A store error
//! aborts the cycle; events appended before the failure stay committed.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  document::DocumentSource,
  entity::{EntityId, EntityState, Listing},
  event::{CycleRecord, Event, NewEvent, Scenario},
  extract::{DerivedFacts, Waterfall},
  snapshot::{Malformed, RawListing, Snapshot},
  store::EventLog,
};

// ─── Classification ──────────────────────────────────────────────────────────

/// Decide which scenario, if any, `listing` triggers given the entity's latest
/// event. Entities in a snapshot are always active afterwards.
pub fn classify(prior: Option<&Event>, listing: &Listing, bootstrap: bool) -> Option<Scenario> {
  match (EntityState::of(prior), prior) {
    (EntityState::Unseen, _) if bootstrap => Some(Scenario::Seed),
    (EntityState::Unseen, _) => Some(Scenario::NewListing),
    (EntityState::Inactive, _) => Some(Scenario::ReListed),
    (EntityState::Active, Some(prior)) if prior.ticker != listing.ticker => {
      Some(Scenario::TickerChange { old: prior.ticker.clone(), new: listing.ticker.clone() })
    }
    (EntityState::Active, Some(prior)) if prior.display_name != listing.display_name => {
      Some(Scenario::NameChange {
        old: prior.display_name.clone(),
        new: listing.display_name.clone(),
      })
    }
    (EntityState::Active, _) => None,
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What happened to one entity during a cycle. Store failures are not an
/// outcome: they abort the whole cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
  Emitted(Event),
  Unchanged,
  Skipped(Malformed),
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
  pub cycle_id:    Uuid,
  pub observed_at: chrono::DateTime<Utc>,
  pub bootstrap:   bool,
  /// Every appended event, in append order.
  pub emitted:     Vec<Event>,
  pub skipped:     Vec<(EntityId, Malformed)>,
  pub unchanged:   usize,
}

impl CycleReport {
  fn record(&mut self, id: EntityId, outcome: EntityOutcome) {
    match outcome {
      EntityOutcome::Emitted(event) => self.emitted.push(event),
      EntityOutcome::Unchanged => self.unchanged += 1,
      EntityOutcome::Skipped(reason) => self.skipped.push((id, reason)),
    }
  }

  /// Number of emitted events whose scenario satisfies `pred`, e.g.
  /// `report.count(|s| matches!(s, Scenario::Delisted))`.
  pub fn count(&self, pred: impl Fn(&Scenario) -> bool) -> usize {
    self.emitted.iter().filter(|e| pred(&e.scenario)).count()
  }

  /// Emitted events downstream consumers should alert on.
  pub fn alerts(&self) -> impl Iterator<Item = &Event> {
    self.emitted.iter().filter(|e| e.scenario.is_alert())
  }
}

/// Summary of one derived-fact refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
  pub refreshed:     usize,
  pub with_revenue:  usize,
  /// Entities whose documents could not be fetched; their previously stored
  /// derived facts are kept.
  pub failed:        Vec<EntityId>,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Drives reconciliation cycles against an explicit [`EventLog`] handle.
///
/// [`Reconciler::reconcile`] takes `&mut self`, so one reconciler never runs
/// two cycles at once. Writers in other processes are caught by the
/// `expected_prior` check on every append.
pub struct Reconciler<S> {
  store:     S,
  waterfall: Waterfall,
}

impl<S: EventLog> Reconciler<S> {
  pub fn new(store: S) -> Self { Self { store, waterfall: Waterfall::revenue() } }

  /// Override the revenue waterfall used by [`Reconciler::refresh_derived`].
  pub fn with_waterfall(mut self, waterfall: Waterfall) -> Self {
    self.waterfall = waterfall;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn into_store(self) -> S { self.store }

  /// A cycle is a bootstrap cycle until one cycle has completed. This keeps a
  /// cold start that was interrupted part-way from flooding `NewListing`
  /// events when it is resumed.
  pub async fn is_bootstrap(&self) -> Result<bool, S::Error> {
    Ok(self.store.last_completed_cycle().await?.is_none())
  }

  /// Run one reconciliation cycle over `snapshot`.
  pub async fn reconcile(&mut self, snapshot: &Snapshot) -> Result<CycleReport, S::Error> {
    let bootstrap = self.is_bootstrap().await?;
    let cycle = CycleRecord {
      cycle_id:     Uuid::new_v4(),
      observed_at:  snapshot.observed_at,
      bootstrap,
      started_at:   Utc::now(),
      completed_at: None,
      emitted:      0,
      skipped:      0,
    };
    self.store.begin_cycle(cycle.clone()).await?;

    // Delisting runs against the state as it was before this cycle.
    let previous = self.store.current_state().await?;

    info!(
      cycle_id = %cycle.cycle_id,
      listings = snapshot.len(),
      known = previous.len(),
      bootstrap,
      "reconciliation cycle started"
    );

    let mut report = CycleReport {
      cycle_id: cycle.cycle_id,
      observed_at: snapshot.observed_at,
      bootstrap,
      emitted: Vec::new(),
      skipped: Vec::new(),
      unchanged: 0,
    };

    for raw in snapshot.iter() {
      let outcome = self.reconcile_entity(raw, &cycle).await?;
      report.record(raw.entity_id, outcome);
    }

    for prior in previous {
      if !prior.is_active || snapshot.contains(prior.entity_id) {
        continue;
      }
      let event = self
        .store
        .append(NewEvent {
          entity_id:      prior.entity_id,
          ticker:         prior.ticker.clone(),
          display_name:   prior.display_name.clone(),
          scenario:       Scenario::Delisted,
          is_active:      false,
          observed_at:    cycle.observed_at,
          cycle_id:       cycle.cycle_id,
          expected_prior: Some(prior.sequence_id),
        })
        .await?;
      debug!(entity_id = %event.entity_id, ticker = %event.ticker, "delisted");
      report.record(event.entity_id, EntityOutcome::Emitted(event));
    }

    self
      .store
      .complete_cycle(
        cycle.cycle_id,
        Utc::now(),
        report.emitted.len() as u64,
        report.skipped.len() as u64,
      )
      .await?;

    info!(
      cycle_id = %cycle.cycle_id,
      emitted = report.emitted.len(),
      unchanged = report.unchanged,
      skipped = report.skipped.len(),
      delisted = report.count(|s| matches!(s, Scenario::Delisted)),
      "reconciliation cycle completed"
    );

    Ok(report)
  }

  /// Read, decide and append for a single entity.
  async fn reconcile_entity(
    &self,
    raw: &RawListing,
    cycle: &CycleRecord,
  ) -> Result<EntityOutcome, S::Error> {
    let listing = match raw.validate() {
      Ok(listing) => listing,
      Err(reason) => {
        warn!(entity_id = %raw.entity_id, %reason, "skipping malformed listing");
        return Ok(EntityOutcome::Skipped(reason));
      }
    };

    let prior = self.store.latest(listing.entity_id).await?;
    let Some(scenario) = classify(prior.as_ref(), &listing, cycle.bootstrap) else {
      return Ok(EntityOutcome::Unchanged);
    };

    let event = self
      .store
      .append(NewEvent {
        entity_id:      listing.entity_id,
        ticker:         listing.ticker,
        display_name:   listing.display_name,
        scenario,
        is_active:      true,
        observed_at:    cycle.observed_at,
        cycle_id:       cycle.cycle_id,
        expected_prior: prior.map(|p| p.sequence_id),
      })
      .await?;

    debug!(entity_id = %event.entity_id, scenario = %event.scenario, "event appended");
    Ok(EntityOutcome::Emitted(event))
  }

  /// Recompute and store derived facts for `ids`.
  ///
  /// A document fetch failure for one entity is logged and counted; the
  /// entity keeps whatever derived facts it had. Only store errors abort.
  pub async fn refresh_derived<D, I>(&self, source: &D, ids: I) -> Result<RefreshReport, S::Error>
  where
    D: DocumentSource,
    I: IntoIterator<Item = EntityId>,
  {
    let mut report = RefreshReport::default();

    for id in ids {
      let documents = match source.documents(id).await {
        Ok(documents) => documents,
        Err(error) => {
          warn!(entity_id = %id, %error, "document fetch failed");
          report.failed.push(id);
          continue;
        }
      };

      let facts = DerivedFacts::extract(id, &documents, &self.waterfall, Utc::now());
      if facts.revenue.is_some() {
        report.with_revenue += 1;
      }
      self.store.record_derived(id, facts).await?;
      report.refreshed += 1;

      if report.refreshed % 100 == 0 {
        info!(refreshed = report.refreshed, failed = report.failed.len(), "derived facts progress");
      }
    }

    Ok(report)
  }

  /// Reconcile `snapshot`, then refresh derived facts for every well-formed
  /// listing in it.
  pub async fn run_cycle<D: DocumentSource>(
    &mut self,
    snapshot: &Snapshot,
    source: &D,
  ) -> Result<(CycleReport, RefreshReport), S::Error> {
    let cycle = self.reconcile(snapshot).await?;
    let ids = snapshot
      .iter()
      .filter(|raw| raw.validate().is_ok())
      .map(|raw| raw.entity_id);
    let refresh = self.refresh_derived(source, ids).await?;
    Ok((cycle, refresh))
  }
}
