//! [`SqliteStore`], the SQLite implementation of [`EventLog`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use secmaster_core::{
  entity::EntityId,
  event::{CycleRecord, Event, NewEvent, SequenceId},
  extract::DerivedFacts,
  store::EventLog,
};

use crate::{
  Error, Result,
  encode::{
    CYCLE_COLUMNS, EVENT_COLUMNS, RawCycle, RawEvent, decode_derived, decode_dt,
    encode_derived, encode_dt, encode_entity_id, encode_scenario, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A securities-master event log backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every call
/// runs on the connection's dedicated thread, so writes are serialised.
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

  /// Open an in-memory store, for tests.
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
    tracing::debug!("sqlite schema initialised");
    Ok(())
  }

  /// Total number of events in the log.
  pub async fn event_count(&self) -> Result<u64> {
    let n: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?))
      .await?;
    Ok(n.max(0) as u64)
  }

  async fn query_events(
    &self,
    sql: String,
    entity: Option<i64>,
  ) -> Result<Vec<Event>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = match entity {
          Some(id) => stmt
            .query_map(rusqlite::params![id], RawEvent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map([], RawEvent::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}

// ─── EventLog impl ───────────────────────────────────────────────────────────

impl EventLog for SqliteStore {
  type Error = Error;

  // ── Events ────────────────────────────────────────────────────────────────

  async fn latest(&self, id: EntityId) -> Result<Option<Event>> {
    let sql = format!(
      "SELECT {} FROM current_state c
       JOIN events e ON e.sequence_id = c.sequence_id
       WHERE c.entity_id = ?1",
      EVENT_COLUMNS
    );
    let mut events = self.query_events(sql, Some(encode_entity_id(id)?)).await?;
    Ok(events.pop())
  }

  async fn append(&self, event: NewEvent) -> Result<Event> {
    let entity_raw          = encode_entity_id(event.entity_id)?;
    let (scenario, detail)  = encode_scenario(&event.scenario)?;
    let observed_at_str     = encode_dt(event.observed_at);
    let cycle_id_str        = encode_uuid(event.cycle_id);
    let expected            = event.expected_prior.map(|s| s.0);
    let ticker              = event.ticker.clone();
    let display_name        = event.display_name.clone();
    let is_active           = event.is_active;
    // Round-trip through the stored form so the returned event compares equal
    // to what `latest` reads back.
    let observed_at         = decode_dt(&observed_at_str)?;

    let outcome: std::result::Result<i64, Option<i64>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let found: Option<i64> = tx
          .query_row(
            "SELECT sequence_id FROM current_state WHERE entity_id = ?1",
            rusqlite::params![entity_raw],
            |r| r.get(0),
          )
          .optional()?;
        if found != expected {
          return Ok(Err(found));
        }

        tx.execute(
          "INSERT INTO events (
             entity_id, ticker, display_name, scenario, detail_json,
             is_active, observed_at, cycle_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            entity_raw,
            ticker,
            display_name,
            scenario,
            detail,
            is_active,
            observed_at_str,
            cycle_id_str,
          ],
        )?;
        let sequence_id = tx.last_insert_rowid();

        // Only move the projection forward in (observed_at, sequence_id).
        tx.execute(
          "INSERT INTO current_state (entity_id, sequence_id, observed_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(entity_id) DO UPDATE SET
             sequence_id = excluded.sequence_id,
             observed_at = excluded.observed_at
           WHERE excluded.observed_at > current_state.observed_at
              OR (excluded.observed_at = current_state.observed_at
                  AND excluded.sequence_id > current_state.sequence_id)",
          rusqlite::params![entity_raw, sequence_id, observed_at_str],
        )?;

        tx.commit()?;
        Ok(Ok(sequence_id))
      })
      .await?;

    let sequence_id = outcome.map_err(|found| Error::StaleAppend {
      entity_id: event.entity_id,
      expected:  event.expected_prior,
      found:     found.map(SequenceId),
    })?;

    Ok(Event {
      sequence_id: SequenceId(sequence_id),
      entity_id: event.entity_id,
      ticker: event.ticker,
      display_name: event.display_name,
      scenario: event.scenario,
      is_active: event.is_active,
      observed_at,
      cycle_id: event.cycle_id,
    })
  }

  async fn current_state(&self) -> Result<Vec<Event>> {
    let sql = format!(
      "SELECT {} FROM current_state c
       JOIN events e ON e.sequence_id = c.sequence_id
       ORDER BY c.entity_id",
      EVENT_COLUMNS
    );
    self.query_events(sql, None).await
  }

  async fn history(&self, id: EntityId) -> Result<Vec<Event>> {
    let sql = format!(
      "SELECT {} FROM events e
       WHERE e.entity_id = ?1
       ORDER BY e.observed_at, e.sequence_id",
      EVENT_COLUMNS
    );
    self.query_events(sql, Some(encode_entity_id(id)?)).await
  }

  // ── Cycles ────────────────────────────────────────────────────────────────

  async fn begin_cycle(&self, cycle: CycleRecord) -> Result<()> {
    let id_str       = encode_uuid(cycle.cycle_id);
    let observed_str = encode_dt(cycle.observed_at);
    let started_str  = encode_dt(cycle.started_at);
    let completed    = cycle.completed_at.map(encode_dt);
    let bootstrap    = cycle.bootstrap;
    let emitted      = cycle.emitted as i64;
    let skipped      = cycle.skipped as i64;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO cycles (
             cycle_id, observed_at, bootstrap, started_at, completed_at, emitted, skipped
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            observed_str,
            bootstrap,
            started_str,
            completed,
            emitted,
            skipped
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn complete_cycle(
    &self,
    cycle_id:     Uuid,
    completed_at: DateTime<Utc>,
    emitted:      u64,
    skipped:      u64,
  ) -> Result<()> {
    let id_str = encode_uuid(cycle_id);
    let at_str = encode_dt(completed_at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE cycles SET completed_at = ?2, emitted = ?3, skipped = ?4
           WHERE cycle_id = ?1",
          rusqlite::params![id_str, at_str, emitted as i64, skipped as i64],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::CycleNotFound(cycle_id));
    }
    Ok(())
  }

  async fn last_completed_cycle(&self) -> Result<Option<CycleRecord>> {
    let sql = format!(
      "SELECT {} FROM cycles
       WHERE completed_at IS NOT NULL
       ORDER BY completed_at DESC
       LIMIT 1",
      CYCLE_COLUMNS
    );

    let raw: Option<RawCycle> = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], RawCycle::from_row).optional()?))
      .await?;

    raw.map(RawCycle::into_cycle).transpose()
  }

  // ── Derived facts ─────────────────────────────────────────────────────────

  async fn record_derived(&self, id: EntityId, facts: DerivedFacts) -> Result<()> {
    let entity_raw = encode_entity_id(id)?;
    let json       = encode_derived(&facts)?;
    let at_str     = encode_dt(facts.refreshed_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO derived_facts (entity_id, facts_json, refreshed_at)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(entity_id) DO UPDATE SET
             facts_json   = excluded.facts_json,
             refreshed_at = excluded.refreshed_at",
          rusqlite::params![entity_raw, json, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn derived(&self, id: EntityId) -> Result<Option<DerivedFacts>> {
    let entity_raw = encode_entity_id(id)?;

    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT facts_json FROM derived_facts WHERE entity_id = ?1",
              rusqlite::params![entity_raw],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    json.as_deref().map(decode_derived).transpose()
  }
}
