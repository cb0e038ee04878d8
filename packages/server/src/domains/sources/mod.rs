//! Sources domain - polled feeds, their run history and health governor.

pub mod health;
pub mod models;
mod store;

pub use health::{
    apply_health_policy, compute_streaks, get_source_run_streaks, HealthPolicy, SourceRunStreaks,
};
pub use models::{HealthAlert, PauseReason, RunStatus, Source, SourceRun};
pub use store::SourceStore;
