//! Read-only JSON API over the securities master.
//!
//! Exposes an axum [`Router`] backed by any [`secmaster_core::store::EventLog`].
//! Nothing here writes to the log; cycles are driven by the sync binary.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", secmaster_api::api_router(store.clone()))
//! ```

pub mod cycles;
pub mod entities;
pub mod error;

use std::sync::Arc;

use axum::{Router, routing::get};
use secmaster_core::store::EventLog;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: EventLog + 'static,
{
  Router::new()
    // Entities
    .route("/entities", get(entities::list::<S>))
    .route("/entities/{cik}", get(entities::get_one::<S>))
    .route("/entities/{cik}/events", get(entities::events::<S>))
    // Cycles
    .route("/cycles/latest", get(cycles::latest::<S>))
    .with_state(store)
}
