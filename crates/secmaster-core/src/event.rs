//! Events, the fundamental unit of the securities master.
//!
//! An event is an immutable, timestamped observation that an entity's ticker,
//! name or active status changed (or was first seen). Events are never
//! updated or deleted; an entity's current state is its latest event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, entity::EntityId};

// ─── Sequence ────────────────────────────────────────────────────────────────

/// Store-assigned, monotonically increasing position of an event in the log.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceId(pub i64);

impl fmt::Display for SequenceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ─── Scenario ────────────────────────────────────────────────────────────────

/// Classification of an event. The variant name serves as the `scenario`
/// discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Scenario {
  /// Baseline state established by a bootstrap cycle. Not a real-world event.
  Seed,
  NewListing,
  TickerChange { old: String, new: String },
  NameChange { old: String, new: String },
  Delisted,
  ReListed,
}

impl Scenario {
  /// The discriminant string stored in the `scenario` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Seed => "seed",
      Self::NewListing => "new_listing",
      Self::TickerChange { .. } => "ticker_change",
      Self::NameChange { .. } => "name_change",
      Self::Delisted => "delisted",
      Self::ReListed => "re_listed",
    }
  }

  /// Canonical upper-case label used in reports and alerts.
  pub fn label(&self) -> &'static str {
    match self {
      Self::Seed => "SEED",
      Self::NewListing => "NEW_LISTING",
      Self::TickerChange { .. } => "TICKER_CHANGE",
      Self::NameChange { .. } => "NAME_CHANGE",
      Self::Delisted => "DELISTED",
      Self::ReListed => "RE_LISTED",
    }
  }

  /// Whether downstream consumers should treat this as a real-world event.
  /// `Seed` and `NameChange` are informational only.
  pub fn is_alert(&self) -> bool {
    matches!(
      self,
      Self::NewListing | Self::TickerChange { .. } | Self::Delisted | Self::ReListed
    )
  }

  /// Serialise the inner payload (without the type tag) for the
  /// `detail_json` column. Unit variants yield `null`.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored in the
  /// database.
  pub fn from_parts(discriminant: &str, data: serde_json::Value) -> Result<Self> {
    let wrapped = if data.is_null() {
      serde_json::json!({ "type": discriminant })
    } else {
      serde_json::json!({ "type": discriminant, "data": data })
    };
    serde_json::from_value(wrapped)
      .map_err(|_| Error::UnknownScenario(discriminant.to_owned()))
  }
}

impl fmt::Display for Scenario {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::TickerChange { old, new } => write!(f, "{} {old} -> {new}", self.label()),
      Self::NameChange { old, new } => write!(f, "{} {old:?} -> {new:?}", self.label()),
      other => f.write_str(other.label()),
    }
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An immutable record of an observed state change. Once written, no field is
/// ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub sequence_id:  SequenceId,
  pub entity_id:    EntityId,
  pub ticker:       String,
  pub display_name: String,
  pub scenario:     Scenario,
  pub is_active:    bool,
  /// Cycle-level observation time, shared by every event of one cycle.
  pub observed_at:  DateTime<Utc>,
  /// The reconciliation cycle that emitted this event.
  pub cycle_id:     Uuid,
}

impl Event {
  /// The `(observed_at, sequence_id)` key that totally orders an entity's
  /// events.
  pub fn order_key(&self) -> (DateTime<Utc>, SequenceId) {
    (self.observed_at, self.sequence_id)
  }
}

// ─── NewEvent ────────────────────────────────────────────────────────────────

/// Input to [`crate::store::EventLog::append`].
/// `sequence_id` is always assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
  pub entity_id:      EntityId,
  pub ticker:         String,
  pub display_name:   String,
  pub scenario:       Scenario,
  pub is_active:      bool,
  pub observed_at:    DateTime<Utc>,
  pub cycle_id:       Uuid,
  /// The latest sequence the caller based its decision on. The store rejects
  /// the append if the entity's latest event has moved since.
  pub expected_prior: Option<SequenceId>,
}

// ─── Cycles ──────────────────────────────────────────────────────────────────

/// Bookkeeping for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
  pub cycle_id:     Uuid,
  pub observed_at:  DateTime<Utc>,
  pub bootstrap:    bool,
  pub started_at:   DateTime<Utc>,
  /// `None` while the cycle is running or if it was interrupted.
  pub completed_at: Option<DateTime<Utc>>,
  pub emitted:      u64,
  pub skipped:      u64,
}
