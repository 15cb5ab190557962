//! Handlers for `/entities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities` | Active entities; `?include_inactive=true` for all |
//! | `GET`  | `/entities/:cik` | Current view; 404 if never observed |
//! | `GET`  | `/entities/:cik/events` | Full history, oldest first; 404 if never observed |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use secmaster_core::{
  entity::EntityId,
  event::Event,
  projection::{EntityView, current_views, entity_view},
  store::EventLog,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// If `true`, also return delisted entities. Default `false`.
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /entities[?include_inactive=true]`
pub async fn list<S: EventLog>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<EntityView>>, ApiError> {
  let views = current_views(store.as_ref(), params.include_inactive)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(views))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entities/:cik`
pub async fn get_one<S: EventLog>(
  State(store): State<Arc<S>>,
  Path(cik): Path<u64>,
) -> Result<Json<EntityView>, ApiError> {
  let id = EntityId(cik);
  let view = entity_view(store.as_ref(), id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))?;
  Ok(Json(view))
}

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /entities/:cik/events`
pub async fn events<S: EventLog>(
  State(store): State<Arc<S>>,
  Path(cik): Path<u64>,
) -> Result<Json<Vec<Event>>, ApiError> {
  let id = EntityId(cik);
  let history = store.history(id).await.map_err(ApiError::store)?;
  if history.is_empty() {
    return Err(ApiError::NotFound(format!("entity {id} not found")));
  }
  Ok(Json(history))
}
