//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that text comparison in SQL agrees with time
//! order. Scenario payloads and derived facts are stored as compact JSON.
//! UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use secmaster_core::{
  entity::EntityId,
  event::{CycleRecord, Event, Scenario, SequenceId},
  extract::DerivedFacts,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EntityId ─────────────────────────────────────────────────────────────────

pub fn encode_entity_id(id: EntityId) -> Result<i64> { Ok(id.to_i64()?) }

pub fn decode_entity_id(raw: i64) -> Result<EntityId> { Ok(EntityId::from_i64(raw)?) }

// ─── Scenario ─────────────────────────────────────────────────────────────────

pub fn encode_scenario(s: &Scenario) -> Result<(&'static str, String)> {
  Ok((s.discriminant(), s.to_json()?.to_string()))
}

pub fn decode_scenario(discriminant: &str, detail_json: &str) -> Result<Scenario> {
  let data: serde_json::Value = serde_json::from_str(detail_json)?;
  Ok(Scenario::from_parts(discriminant, data)?)
}

// ─── DerivedFacts ─────────────────────────────────────────────────────────────

pub fn encode_derived(facts: &DerivedFacts) -> Result<String> {
  Ok(serde_json::to_string(facts)?)
}

pub fn decode_derived(s: &str) -> Result<DerivedFacts> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawEvent::from_row`], for `SELECT`s over `events e`.
pub const EVENT_COLUMNS: &str = "e.sequence_id, e.entity_id, e.ticker, e.display_name, \
                                 e.scenario, e.detail_json, e.is_active, e.observed_at, \
                                 e.cycle_id";

/// Raw values read directly from an `events` row.
pub struct RawEvent {
  pub sequence_id:  i64,
  pub entity_id:    i64,
  pub ticker:       String,
  pub display_name: String,
  pub scenario:     String,
  pub detail_json:  String,
  pub is_active:    bool,
  pub observed_at:  String,
  pub cycle_id:     String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence_id:  row.get(0)?,
      entity_id:    row.get(1)?,
      ticker:       row.get(2)?,
      display_name: row.get(3)?,
      scenario:     row.get(4)?,
      detail_json:  row.get(5)?,
      is_active:    row.get(6)?,
      observed_at:  row.get(7)?,
      cycle_id:     row.get(8)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      sequence_id:  SequenceId(self.sequence_id),
      entity_id:    decode_entity_id(self.entity_id)?,
      ticker:       self.ticker,
      display_name: self.display_name,
      scenario:     decode_scenario(&self.scenario, &self.detail_json)?,
      is_active:    self.is_active,
      observed_at:  decode_dt(&self.observed_at)?,
      cycle_id:     decode_uuid(&self.cycle_id)?,
    })
  }
}

/// Column list matching [`RawCycle::from_row`].
pub const CYCLE_COLUMNS: &str =
  "cycle_id, observed_at, bootstrap, started_at, completed_at, emitted, skipped";

/// Raw values read directly from a `cycles` row.
pub struct RawCycle {
  pub cycle_id:     String,
  pub observed_at:  String,
  pub bootstrap:    bool,
  pub started_at:   String,
  pub completed_at: Option<String>,
  pub emitted:      i64,
  pub skipped:      i64,
}

impl RawCycle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      cycle_id:     row.get(0)?,
      observed_at:  row.get(1)?,
      bootstrap:    row.get(2)?,
      started_at:   row.get(3)?,
      completed_at: row.get(4)?,
      emitted:      row.get(5)?,
      skipped:      row.get(6)?,
    })
  }

  pub fn into_cycle(self) -> Result<CycleRecord> {
    Ok(CycleRecord {
      cycle_id:     decode_uuid(&self.cycle_id)?,
      observed_at:  decode_dt(&self.observed_at)?,
      bootstrap:    self.bootstrap,
      started_at:   decode_dt(&self.started_at)?,
      completed_at: self.completed_at.as_deref().map(decode_dt).transpose()?,
      emitted:      self.emitted.max(0) as u64,
      skipped:      self.skipped.max(0) as u64,
    })
  }
}
