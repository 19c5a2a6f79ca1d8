//! Postgres storage layer.
//!
//! Two kinds of tables: the date-partitioned feed/flashpoint/clusters tables
//! addressed through [`tables::TableSet`] (identifiers validated, values
//! bound), and the static sidecar tables (`processing_runs`,
//! `feed_entry_jobs`, `feed_entry_vectors`, `cluster_members`) addressed
//! with plain SQL.

pub mod clusters;
pub mod db;
pub mod entries;
pub mod flashpoints;
pub mod jobs;
pub mod runs;
pub mod tables;
pub mod vectors;

pub use clusters::{ClusterStore, MemberDetail, MemberRow};
pub use db::connect;
pub use entries::{EnrichmentUpdate, EntryStore};
pub use flashpoints::FlashpointStore;
pub use jobs::{DedupeRecord, JobStore, SeededSignature};
pub use runs::RunStore;
pub use tables::TableSet;
pub use vectors::VectorStore;
