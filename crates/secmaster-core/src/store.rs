//! The `EventLog` trait.
//!
//! The trait is implemented by storage backends (e.g. `secmaster-store-sqlite`).
//! The reconciler, the API and the exporter depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  entity::EntityId,
  event::{CycleRecord, Event, NewEvent},
  extract::DerivedFacts,
};

/// Abstraction over a securities-master event store.
///
/// Event writes are append-only: nothing ever updates or deletes an event.
/// Derived facts and cycle bookkeeping live beside the log and may be
/// overwritten.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EventLog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Events ────────────────────────────────────────────────────────────

  /// The event with the greatest `(observed_at, sequence_id)` for `id`, or
  /// `None` if the entity was never observed.
  fn latest(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;

  /// Durably append one event and return it with its assigned sequence id.
  ///
  /// Returns an error if `event.expected_prior` does not match the entity's
  /// current latest sequence id; the log is left untouched in that case.
  fn append(
    &self,
    event: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  /// The latest event of every entity ever observed, one per entity, in
  /// ascending entity-id order.
  fn current_state(&self) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  /// Every event for `id`, oldest first.
  fn history(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  // ── Cycles ────────────────────────────────────────────────────────────

  /// Record that a cycle has started.
  fn begin_cycle(
    &self,
    cycle: CycleRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Mark a started cycle as completed with its final counts.
  fn complete_cycle(
    &self,
    cycle_id: Uuid,
    completed_at: DateTime<Utc>,
    emitted: u64,
    skipped: u64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most recently completed cycle, if any cycle ever completed.
  fn last_completed_cycle(
    &self,
  ) -> impl Future<Output = Result<Option<CycleRecord>, Self::Error>> + Send + '_;

  // ── Derived facts ─────────────────────────────────────────────────────

  /// Replace the derived facts stored for `id`.
  fn record_derived(
    &self,
    id: EntityId,
    facts: DerivedFacts,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most recently recorded derived facts for `id`.
  fn derived(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<Option<DerivedFacts>, Self::Error>> + Send + '_;
}
