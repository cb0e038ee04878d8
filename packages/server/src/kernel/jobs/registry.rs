//! Job registry for deserializing and executing jobs.
//!
//! The registry maps each [`JobType`] to a handler that reconstructs the
//! typed payload from JSON and runs the stage. The runner claims rows from
//! the queue and dispatches them here without knowing the concrete types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use super::job::{Job, JobError, JobType};
use super::queue::JobPayload;
use crate::kernel::ServerDeps;

/// Type alias for the async handler function.
///
/// Takes the raw payload and the shared dependencies, returns the JSON
/// result map stored on the job.
type BoxedHandler = Box<
    dyn Fn(
            serde_json::Value,
            Arc<ServerDeps>,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps job types to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = JobRegistry::new();
/// registry.register::<IngestSourceJob, _, _>(|job, deps| async move {
///     handle_ingest_source(job, deps).await
/// });
/// ```
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<JobType, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `J::JOB_TYPE`, replacing any previous one.
    pub fn register<J, F, Fut>(&mut self, handler: F)
    where
        J: JobPayload,
        F: Fn(J, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let job_type = J::JOB_TYPE;
        let boxed: BoxedHandler = Box::new(move |value, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let job: J = serde_json::from_value(value)
                    .map_err(|source| JobError::InvalidPayload { job_type, source })?;
                handler(job, deps).await
            })
        });

        self.handlers.insert(job_type, boxed);
    }

    /// Execute a claimed job using its registered handler.
    ///
    /// Fails with a [`JobError`] when the type is unknown or unregistered,
    /// or the payload does not deserialize; otherwise returns whatever the
    /// handler returns.
    pub async fn execute(&self, job: &Job, deps: Arc<ServerDeps>) -> Result<serde_json::Value> {
        let job_type = job.kind()?;
        let handler = self
            .handlers
            .get(&job_type)
            .ok_or(JobError::NoHandler(job_type))?;

        // Payload-less jobs (e.g. scheduler ticks) deserialize as an empty object.
        let payload = match &job.payload {
            None | Some(serde_json::Value::Null) => serde_json::json!({}),
            Some(value) => value.clone(),
        };

        handler(payload, deps).await
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.handlers.keys().copied().collect()
    }
}

/// Thread-safe registry wrapped in Arc.
pub type SharedJobRegistry = Arc<JobRegistry>;
