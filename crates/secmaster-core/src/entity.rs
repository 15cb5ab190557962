//! Entity identity and the per-entity lifecycle state.
//!
//! An entity's identity is its SEC CIK and never changes. Everything else
//! (ticker, name, active flag) is a projection of its latest event.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, event::Event};

/// A permanent issuer identifier (the SEC Central Index Key).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
  /// The ten-digit, zero-padded form EDGAR uses in document URLs.
  pub fn padded(self) -> String { format!("{:010}", self.0) }

  /// Signed representation for storage backends with `i64` integer columns.
  pub fn to_i64(self) -> Result<i64> {
    i64::try_from(self.0).map_err(|_| Error::EntityIdRange(i128::from(self.0)))
  }

  pub fn from_i64(raw: i64) -> Result<Self> {
    u64::try_from(raw)
      .map(Self)
      .map_err(|_| Error::EntityIdRange(i128::from(raw)))
  }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<u64> for EntityId {
  fn from(raw: u64) -> Self { Self(raw) }
}

/// Lifecycle state of an entity, derived from its latest event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityState {
  /// No event has ever been recorded.
  Unseen,
  Active,
  Inactive,
}

impl EntityState {
  pub fn of(latest: Option<&Event>) -> Self {
    match latest {
      None => Self::Unseen,
      Some(e) if e.is_active => Self::Active,
      Some(_) => Self::Inactive,
    }
  }
}

/// A validated listing: the identifying fields every event must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
  pub entity_id:    EntityId,
  /// Trimmed and upper-cased.
  pub ticker:       String,
  /// Trimmed.
  pub display_name: String,
}
