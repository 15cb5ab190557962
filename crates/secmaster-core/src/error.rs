//! Error types for `secmaster-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown scenario discriminant: {0:?}")]
  UnknownScenario(String),

  #[error("entity id {0} is out of range")]
  EntityIdRange(i128),

  #[error("invalid waterfall concept {0:?}, expected `namespace:tag`")]
  InvalidConcept(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
