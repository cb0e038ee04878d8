//! Test harnesses.
//!
//! [`PipelineHarness`] runs the real job registry against the in-memory
//! store and mock collaborators. [`TestHarness`] gives each test its own
//! database inside a shared Postgres container.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;
use vulnwatch_core::domains::pipeline::build_job_registry;
use vulnwatch_core::kernel::jobs::testing::{run_all_jobs, test_runner};
use vulnwatch_core::kernel::jobs::{Job, JobOutcome, JobRunner, JobStatus, JobType};
use vulnwatch_core::kernel::{MemoryStore, PostgresStore, ServerDeps, TestDependencies};

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// In-memory pipeline
// =============================================================================

pub struct PipelineHarness {
    pub test_deps: TestDependencies,
    pub deps: Arc<ServerDeps>,
    pub runner: JobRunner,
}

impl PipelineHarness {
    pub fn new(test_deps: TestDependencies) -> Self {
        init_tracing();
        let deps = test_deps.clone().into_deps();
        let runner = test_runner(build_job_registry(), deps.clone(), "test-worker");
        Self {
            test_deps,
            deps,
            runner,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.test_deps.store
    }

    /// Run until the queue is empty, follow-up stages included.
    pub async fn run_all(&self) -> Vec<JobOutcome> {
        run_all_jobs(&self.runner)
            .await
            .expect("queue error while draining")
    }

    pub fn jobs_of_type(&self, job_type: JobType) -> Vec<Job> {
        self.store().jobs_of_type(job_type)
    }

    /// Assert every job of `job_type` ended in `status`, returning them.
    pub fn assert_all(&self, job_type: JobType, status: JobStatus) -> Vec<Job> {
        let jobs = self.jobs_of_type(job_type);
        for job in &jobs {
            assert_eq!(
                job.status, status,
                "{job_type} job {} ended {} (error: {:?})",
                job.id, job.status, job.error
            );
        }
        jobs
    }
}

// =============================================================================
// Postgres (testcontainers)
// =============================================================================

/// Shared Postgres container, started once per test binary.
struct SharedTestInfra {
    admin_url: String,
    base_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

        Ok(Self {
            admin_url: format!("{base_url}/postgres"),
            base_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test database with migrations applied.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// #[ignore = "requires Docker"]
/// async fn my_test(ctx: &TestHarness) {
///     ctx.store.enqueue("cve_sync", None, true).await.unwrap();
/// }
/// ```
pub struct TestHarness {
    pub store: Arc<PostgresStore>,
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_name = format!("vulnwatch_{}", Uuid::new_v4().simple());
        let admin = PgPool::connect(&infra.admin_url)
            .await
            .context("Failed to connect to admin database")?;
        sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
            .execute(&admin)
            .await
            .context("Failed to create test database")?;
        admin.close().await;

        let store = PostgresStore::connect(&format!("{}/{db_name}", infra.base_url)).await?;
        store.migrate().await?;

        Ok(Self {
            db_pool: store.pool().clone(),
            store: Arc::new(store),
        })
    }
}
