//! Read models derived from the event log.
//!
//! Nothing here is stored as a mutable row. An [`EntityView`] is assembled on
//! read from an entity's latest event plus its most recent derived facts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{EntityId, EntityState},
  event::{Event, Scenario, SequenceId},
  extract::DerivedFacts,
  store::EventLog,
};

/// The computed current-state read model for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityView {
  pub entity_id:     EntityId,
  pub ticker:        String,
  pub display_name:  String,
  pub state:         EntityState,
  /// Scenario of the latest event; i.e. how the entity got into `state`.
  pub last_scenario: Scenario,
  /// When the latest event was observed.
  pub since:         DateTime<Utc>,
  pub sequence_id:   SequenceId,
  pub derived:       Option<DerivedFacts>,
}

impl EntityView {
  pub fn from_latest(latest: Event, derived: Option<DerivedFacts>) -> Self {
    let state = EntityState::of(Some(&latest));
    Self {
      entity_id: latest.entity_id,
      ticker: latest.ticker,
      display_name: latest.display_name,
      state,
      last_scenario: latest.scenario,
      since: latest.observed_at,
      sequence_id: latest.sequence_id,
      derived,
    }
  }

  pub fn is_active(&self) -> bool { self.state == EntityState::Active }

  /// Latest revenue figure, if one was extracted.
  pub fn revenue(&self) -> Option<f64> {
    self.derived.as_ref()?.revenue.as_ref().map(|r| r.value)
  }
}

/// Materialise the view for a single entity. Returns `None` if the entity was
/// never observed.
pub async fn entity_view<S: EventLog>(
  store: &S,
  id: EntityId,
) -> Result<Option<EntityView>, S::Error> {
  let Some(latest) = store.latest(id).await? else {
    return Ok(None);
  };
  let derived = store.derived(id).await?;
  Ok(Some(EntityView::from_latest(latest, derived)))
}

/// Materialise views for every known entity, in entity-id order. Inactive
/// entities are dropped unless `include_inactive` is set.
pub async fn current_views<S: EventLog>(
  store: &S,
  include_inactive: bool,
) -> Result<Vec<EntityView>, S::Error> {
  let mut views = Vec::new();
  for latest in store.current_state().await? {
    if !include_inactive && !latest.is_active {
      continue;
    }
    let derived = store.derived(latest.entity_id).await?;
    views.push(EntityView::from_latest(latest, derived));
  }
  Ok(views)
}
