//! Handlers for `/cycles` endpoints.

use std::sync::Arc;

use axum::{Json, extract::State};
use secmaster_core::{event::CycleRecord, store::EventLog};

use crate::error::ApiError;

/// `GET /cycles/latest`: the most recently completed cycle; 404 before the
/// first cycle completes.
pub async fn latest<S: EventLog>(
  State(store): State<Arc<S>>,
) -> Result<Json<CycleRecord>, ApiError> {
  let cycle = store
    .last_completed_cycle()
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound("no completed cycle".into()))?;
  Ok(Json(cycle))
}
