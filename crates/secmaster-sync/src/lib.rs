//! EDGAR ingestion, configuration and reporting for the `secmaster` binary.
//!
//! The binary wires these together: [`edgar::EdgarClient`] produces a
//! snapshot and serves per-entity documents, the core reconciler records
//! what changed, and [`export`] writes the current state out as CSV.

pub mod config;
pub mod edgar;
pub mod export;
pub mod retry;

pub use config::SyncConfig;
