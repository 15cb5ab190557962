//! Snapshots: one polling cycle's view of every listed entity.
//!
//! Listings arrive unvalidated from the fetcher. Validation happens per entity
//! inside the reconciler so that one malformed row never aborts a cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{EntityId, Listing};

/// A listing row as received, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
  pub entity_id:    EntityId,
  pub ticker:       Option<String>,
  pub display_name: Option<String>,
}

impl RawListing {
  pub fn new(entity_id: impl Into<EntityId>, ticker: &str, display_name: &str) -> Self {
    Self {
      entity_id:    entity_id.into(),
      ticker:       Some(ticker.to_owned()),
      display_name: Some(display_name.to_owned()),
    }
  }

  /// Normalise and check the required fields.
  pub fn validate(&self) -> Result<Listing, Malformed> {
    let ticker = required(self.ticker.as_deref()).ok_or(Malformed::MissingTicker)?;
    let display_name = required(self.display_name.as_deref()).ok_or(Malformed::MissingName)?;
    Ok(Listing {
      entity_id: self.entity_id,
      ticker: ticker.to_uppercase(),
      display_name: display_name.to_owned(),
    })
  }
}

fn required(field: Option<&str>) -> Option<&str> {
  field.map(str::trim).filter(|s| !s.is_empty())
}

/// Why a listing was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Malformed {
  #[error("listing has no ticker")]
  MissingTicker,
  #[error("listing has no display name")]
  MissingName,
}

/// All listings observed in one cycle, keyed by entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
  /// Cycle-level timestamp stamped on every event the cycle emits.
  pub observed_at: DateTime<Utc>,
  listings:        BTreeMap<EntityId, RawListing>,
}

impl Snapshot {
  pub fn new(observed_at: DateTime<Utc>) -> Self {
    Self { observed_at, listings: BTreeMap::new() }
  }

  /// Add a listing. The first listing for an entity wins; returns `false` if
  /// the entity was already present and `listing` was dropped.
  pub fn insert(&mut self, listing: RawListing) -> bool {
    match self.listings.entry(listing.entity_id) {
      std::collections::btree_map::Entry::Occupied(_) => false,
      std::collections::btree_map::Entry::Vacant(slot) => {
        slot.insert(listing);
        true
      }
    }
  }

  pub fn contains(&self, id: EntityId) -> bool { self.listings.contains_key(&id) }

  pub fn get(&self, id: EntityId) -> Option<&RawListing> { self.listings.get(&id) }

  pub fn len(&self) -> usize { self.listings.len() }

  pub fn is_empty(&self) -> bool { self.listings.is_empty() }

  /// Listings in ascending entity-id order.
  pub fn iter(&self) -> impl Iterator<Item = &RawListing> { self.listings.values() }

  pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
    self.listings.keys().copied()
  }
}

impl FromIterator<RawListing> for Snapshot {
  /// Collects with `observed_at = now`.
  fn from_iter<I: IntoIterator<Item = RawListing>>(iter: I) -> Self {
    let mut snapshot = Self::new(Utc::now());
    for listing in iter {
      snapshot.insert(listing);
    }
    snapshot
  }
}
