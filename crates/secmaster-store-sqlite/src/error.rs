//! Error type for `secmaster-store-sqlite`.

use secmaster_core::{entity::EntityId, event::SequenceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] secmaster_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The entity's latest event moved between the caller's read and its
  /// append; another writer got there first.
  #[error(
    "stale append for entity {entity_id}: expected latest {expected:?}, found {found:?}"
  )]
  StaleAppend {
    entity_id: EntityId,
    expected:  Option<SequenceId>,
    found:     Option<SequenceId>,
  },

  #[error("cycle not found: {0}")]
  CycleNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
