//! Job infrastructure for background pipeline execution.
//!
//! This module provides the kernel-level infrastructure for job execution:
//! - [`JobQueue`] - Lease-based queue contract (Postgres and in-memory)
//! - [`JobRegistry`] - Maps each [`JobType`] to its handler
//! - [`JobRunner`] - Long-running loop that claims and executes jobs
//! - [`Job`] - Job row model
//!
//! # Architecture
//!
//! ```text
//! Handler calls deps.jobs.enqueue_job(payload)
//!     │
//!     └─► INSERT queued row (debounced per job type when asked)
//!
//! JobRunner
//!     │
//!     ├─► claim_next (requeue stale leases, SKIP LOCKED)
//!     ├─► JobRegistry.execute(job) → handler
//!     └─► complete / fail
//! ```
//!
//! Stage handlers live in their domains; this module only provides the
//! machinery.

mod job;
mod queue;
mod registry;
mod runner;
pub mod testing;

pub use job::{Job, JobError, JobStatus, JobType, STALE_LOCK_ERROR};
pub use queue::{EnqueueResult, JobPayload, JobQueue, JobQueueExt};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobOutcome, JobRunner, JobRunnerConfig};
