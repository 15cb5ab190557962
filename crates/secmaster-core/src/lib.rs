//! Core types and trait definitions for the secmaster securities master.
//!
//! This crate has no HTTP or database dependencies. It owns
//! the event model, the extraction waterfalls, the [`store::EventLog`]
//! abstraction and the [`reconcile::Reconciler`] state machine. Fetching and
//! persistence live in sibling crates.

// Trait methods spell out `Send` futures where callers need them; impls use
// plain `async fn`.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod entity;
pub mod error;
pub mod event;
pub mod extract;
pub mod labels;
pub mod projection;
pub mod reconcile;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
