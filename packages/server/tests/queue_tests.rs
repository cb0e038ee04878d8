//! Queue semantics against the in-memory store: exclusive claims, debounce,
//! stale-lease recovery and dispatch failures.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use vulnwatch_core::domains::pipeline::{build_job_registry, CveSyncJob, IngestSourceJob};
use vulnwatch_core::kernel::jobs::testing::test_runner;
use vulnwatch_core::kernel::jobs::{
    JobOutcome, JobQueue, JobQueueExt, JobStatus, JobType, STALE_LOCK_ERROR,
};
use vulnwatch_core::kernel::{MemoryStore, TestDependencies};

#[tokio::test]
async fn concurrent_workers_never_claim_the_same_job() {
    let store = Arc::new(MemoryStore::new());
    for i in 0..40 {
        store
            .enqueue_job(IngestSourceJob::new(format!("s{i}")))
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let worker_id = format!("worker-{w}");
            let mut claimed = Vec::new();
            while let Some(job) = store.claim_next(&worker_id, None, None).await.unwrap() {
                assert_eq!(job.locked_by.as_deref(), Some(worker_id.as_str()));
                claimed.push(job.id);
                tokio::task::yield_now().await;
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 40);
    assert_eq!(unique.len(), 40);
}

#[tokio::test]
async fn debounced_enqueue_collapses_until_terminal() {
    let store = MemoryStore::new();

    let first = store.enqueue_job(CveSyncJob::default()).await.unwrap();
    let second = store.enqueue_job(CveSyncJob::default()).await.unwrap();
    assert!(first.is_created());
    assert!(!second.is_created());
    assert_eq!(first.job_id(), second.job_id());

    // Still collapses while running
    let job = store.claim_next("w1", None, None).await.unwrap().unwrap();
    let third = store.enqueue_job(CveSyncJob::default()).await.unwrap();
    assert_eq!(third.job_id(), job.id);

    store.complete(job.id, "w1", serde_json::json!({})).await.unwrap();
    let fourth = store.enqueue_job(CveSyncJob::default()).await.unwrap();
    assert!(fourth.is_created());
    assert_ne!(fourth.job_id(), job.id);
}

#[tokio::test]
async fn non_debounced_enqueue_always_inserts() {
    let store = MemoryStore::new();
    store.enqueue_job(IngestSourceJob::new("s1")).await.unwrap();
    store.enqueue_job(IngestSourceJob::new("s1")).await.unwrap();
    assert_eq!(store.jobs_of_type(JobType::IngestSource).len(), 2);
}

#[tokio::test]
async fn stale_lease_is_reclaimed_by_another_worker() {
    let store = MemoryStore::new();
    let id = store
        .enqueue_job(IngestSourceJob::new("s1"))
        .await
        .unwrap()
        .job_id();

    let lease = Duration::minutes(15);
    let claimed = store.claim_next("w1", None, Some(lease)).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);

    // Within the lease nobody else gets it
    assert!(store.claim_next("w2", None, Some(lease)).await.unwrap().is_none());

    assert!(store.backdate_lease(id, Duration::minutes(16)));
    let reclaimed = store.claim_next("w2", None, Some(lease)).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, id);
    assert_eq!(reclaimed.locked_by.as_deref(), Some("w2"));
    assert_eq!(reclaimed.status, JobStatus::Running);
    assert_eq!(reclaimed.error.as_deref(), Some(STALE_LOCK_ERROR));

    // The stalled worker no longer owns the job
    assert!(!store.complete(id, "w1", serde_json::json!({ "from": "w1" })).await.unwrap());
    assert!(!store.fail(id, "w1", "late").await.unwrap());
    let job = store.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.locked_by.as_deref(), Some("w2"));

    assert!(store.complete(id, "w2", serde_json::json!({})).await.unwrap());
    // Terminal rows stay terminal
    assert!(!store.fail(id, "w2", "late").await.unwrap());
}

#[tokio::test]
async fn allowed_types_restrict_claims() {
    let store = MemoryStore::new();
    store.enqueue_job(IngestSourceJob::new("s1")).await.unwrap();
    store.enqueue_job(CveSyncJob::default()).await.unwrap();

    let only_cve = [JobType::CveSync];
    let job = store
        .claim_next("w1", Some(&only_cve), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.job_type, "cve_sync");
    assert!(store.claim_next("w1", Some(&only_cve), None).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_job_type_and_bad_payload_fail_the_job() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.clone().into_deps();
    let runner = test_runner(build_job_registry(), deps.clone(), "w1");

    let unknown = deps
        .jobs
        .enqueue("send_newsletter", None, false)
        .await
        .unwrap()
        .job_id();
    let malformed = deps
        .jobs
        .enqueue("ingest_source", Some(serde_json::json!({ "source": 7 })), false)
        .await
        .unwrap()
        .job_id();

    assert_eq!(runner.process_next().await.unwrap(), JobOutcome::Failed(unknown));
    assert_eq!(runner.process_next().await.unwrap(), JobOutcome::Failed(malformed));
    assert_eq!(runner.process_next().await.unwrap(), JobOutcome::Idle);

    let unknown = deps.jobs.get_job(unknown).await.unwrap().unwrap();
    assert_eq!(unknown.status, JobStatus::Failed);
    assert!(unknown.error.unwrap().contains("unknown job type: send_newsletter"));

    let malformed = deps.jobs.get_job(malformed).await.unwrap().unwrap();
    assert!(malformed.error.unwrap().contains("invalid payload for ingest_source"));
}
