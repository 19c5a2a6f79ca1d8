pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ScoreWeights};
pub use error::FailureReason;
pub use types::{
    ClusterOutput, FeedEntry, Flashpoint, GeoEntity, JobStatus, RunStatus, Tier,
};
