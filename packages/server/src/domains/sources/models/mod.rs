pub mod health_alert;
pub mod source;
pub mod source_run;

pub use health_alert::{HealthAlert, PauseReason};
pub use source::Source;
pub use source_run::{RunStatus, SourceRun};
