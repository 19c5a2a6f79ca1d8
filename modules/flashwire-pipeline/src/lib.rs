//! Stage algorithms for the enrichment and clustering pipeline.
//!
//! Everything here is run-agnostic: the orchestrator owns run state and
//! persistence, these modules own the work. Per-entry failures surface as
//! typed errors that map onto the persisted failure taxonomy; nothing in
//! this crate aborts a run on its own.

pub mod alerts;
pub mod browser;
pub mod cluster;
pub mod dedupe;
pub mod embed;
pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod score;
pub mod stats;
pub mod summarize;
