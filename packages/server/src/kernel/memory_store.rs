//! In-process store implementing every repository trait.
//!
//! One mutex guards all tables, so each trait call is atomic the same way a
//! Postgres transaction is. Used by tests and local dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domains::articles::{Article, ArticleStore, ArticleSummary};
use crate::domains::cve::{CveChange, CveRecord, CveSnapshot, CveStore};
use crate::domains::settings::SettingsStore;
use crate::domains::sources::{HealthAlert, RunStatus, Source, SourceRun, SourceStore};
use crate::kernel::jobs::{EnqueueResult, Job, JobQueue, JobStatus, JobType, STALE_LOCK_ERROR};

#[derive(Default)]
struct MemoryState {
    jobs: Vec<Job>,
    settings: HashMap<String, serde_json::Value>,
    sources: BTreeMap<String, Source>,
    runs: Vec<SourceRun>,
    alerts: Vec<HealthAlert>,
    articles: Vec<Article>,
    cves: BTreeMap<String, CveRecord>,
    snapshots: Vec<CveSnapshot>,
    changes: Vec<CveChange>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move a job's lease back in time, as if its worker had stalled.
    pub fn backdate_lease(&self, job_id: Uuid, by: chrono::Duration) -> bool {
        let mut state = self.state();
        match state.jobs.iter_mut().find(|j| j.id == job_id) {
            Some(job) => {
                job.locked_at = job.locked_at.map(|at| at - by);
                true
            }
            None => false,
        }
    }

    /// Move a source's last check back in time so it becomes due again.
    pub fn backdate_source_check(&self, source_id: &str, by: chrono::Duration) -> bool {
        let mut state = self.state();
        match state.sources.get_mut(source_id) {
            Some(source) => {
                source.last_checked_at = source.last_checked_at.map(|at| at - by);
                true
            }
            None => false,
        }
    }

    /// Jobs of one type, oldest first.
    pub fn jobs_of_type(&self, job_type: JobType) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .state()
            .jobs
            .iter()
            .filter(|j| j.job_type == job_type.as_str())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.requested_at, j.id));
        jobs
    }
}

// ============================================================================
// Jobs
// ============================================================================

#[async_trait]
impl JobQueue for MemoryStore {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Option<serde_json::Value>,
        debounce: bool,
    ) -> Result<EnqueueResult> {
        let mut state = self.state();

        if debounce {
            let existing = state
                .jobs
                .iter()
                .filter(|j| j.job_type == job_type && j.status.is_in_flight())
                .min_by_key(|j| (j.requested_at, j.id));
            if let Some(job) = existing {
                debug!(job_id = %job.id, job_type, "debounced enqueue hit in-flight job");
                return Ok(EnqueueResult::Duplicate(job.id));
            }
        }

        let job = Job::new(job_type, payload);
        let id = job.id;
        state.jobs.push(job);
        debug!(job_id = %id, job_type, "enqueued job");
        Ok(EnqueueResult::Created(id))
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        allowed_types: Option<&[JobType]>,
        lease_timeout: Option<chrono::Duration>,
    ) -> Result<Option<Job>> {
        let mut state = self.state();
        let now = Utc::now();

        if let Some(timeout) = lease_timeout {
            let mut requeued = 0;
            for job in state.jobs.iter_mut().filter(|j| j.lease_expired(timeout, now)) {
                job.status = JobStatus::Queued;
                job.locked_by = None;
                job.locked_at = None;
                job.error = Some(STALE_LOCK_ERROR.to_string());
                requeued += 1;
            }
            if requeued > 0 {
                warn!(count = requeued, worker_id, "requeued jobs with stale leases");
            }
        }

        let allowed = |job: &Job| match allowed_types {
            None => true,
            Some(types) => types.iter().any(|t| t.as_str() == job.job_type),
        };

        let candidate = state
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Queued && j.locked_by.is_none() && allowed(j))
            .min_by_key(|j| (j.requested_at, j.id));

        Ok(candidate.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.locked_by = Some(worker_id.to_string());
            job.locked_at = Some(now);
            job.clone()
        }))
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<bool> {
        let mut state = self.state();
        let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| {
                j.id == job_id
                    && j.status == JobStatus::Running
                    && j.locked_by.as_deref() == Some(worker_id)
            })
        else {
            return Ok(false);
        };
        job.status = JobStatus::Succeeded;
        job.result = Some(result);
        job.finished_at = Some(Utc::now());
        job.locked_by = None;
        job.locked_at = None;
        Ok(true)
    }

    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool> {
        let mut state = self.state();
        let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| {
                j.id == job_id
                    && j.status == JobStatus::Running
                    && j.locked_by.as_deref() == Some(worker_id)
            })
        else {
            return Ok(false);
        };
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.finished_at = Some(Utc::now());
        job.locked_by = None;
        job.locked_at = None;
        Ok(true)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.state().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let mut jobs = self.state().jobs.clone();
        jobs.sort_by_key(|j| std::cmp::Reverse((j.requested_at, j.id)));
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }
}

// ============================================================================
// Settings
// ============================================================================

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.state().settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.state().settings.insert(key.to_string(), value);
        Ok(())
    }
}

// ============================================================================
// Sources
// ============================================================================

#[async_trait]
impl SourceStore for MemoryStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        let mut state = self.state();
        let now = Utc::now();
        match state.sources.get_mut(&source.id) {
            Some(existing) => {
                existing.name = source.name.clone();
                existing.enabled = source.enabled;
                existing.url = source.url.clone();
                existing.kind = source.kind.clone();
                existing.interval_minutes = source.interval_minutes;
                existing.pause_until = source.pause_until;
                existing.paused_reason = source.paused_reason.clone();
                existing.tags = source.tags.clone();
                existing.updated_at = now;
            }
            None => {
                let mut stored = source.clone();
                stored.last_checked_at = None;
                stored.last_ok_at = None;
                stored.last_error = None;
                stored.created_at = now;
                stored.updated_at = now;
                state.sources.insert(source.id.clone(), stored);
            }
        }
        Ok(())
    }

    async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        Ok(self.state().sources.get(source_id).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.state().sources.values().cloned().collect())
    }

    async fn list_due_sources(&self, now: DateTime<Utc>) -> Result<Vec<Source>> {
        let mut due: Vec<Source> = self
            .state()
            .sources
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        // NULLS FIRST, then oldest check
        due.sort_by(|a, b| {
            (a.last_checked_at.is_some(), a.last_checked_at, &a.id)
                .cmp(&(b.last_checked_at.is_some(), b.last_checked_at, &b.id))
        });
        Ok(due)
    }

    async fn record_run(&self, run: &SourceRun) -> Result<()> {
        let mut state = self.state();
        let Some(source) = state.sources.get_mut(&run.source_id) else {
            bail!("unknown source: {}", run.source_id);
        };

        source.last_checked_at = Some(run.created_at);
        if run.status == RunStatus::Ok {
            source.last_ok_at = Some(run.created_at);
        }
        source.last_error = run.error.clone();
        source.updated_at = Utc::now();

        state.runs.push(run.clone());
        Ok(())
    }

    async fn recent_runs(&self, source_id: &str, limit: i64) -> Result<Vec<SourceRun>> {
        let mut runs: Vec<SourceRun> = self
            .state()
            .runs
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        runs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(runs)
    }

    async fn pause_source(
        &self,
        source_id: &str,
        pause_until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        let mut state = self.state();
        if let Some(source) = state.sources.get_mut(source_id) {
            source.enabled = false;
            source.pause_until = Some(pause_until);
            source.paused_reason = Some(reason.to_string());
            source.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_health_alert(&self, alert: &HealthAlert) -> Result<()> {
        self.state().alerts.push(alert.clone());
        Ok(())
    }

    async fn list_health_alerts(&self, limit: i64) -> Result<Vec<HealthAlert>> {
        let mut alerts = self.state().alerts.clone();
        alerts.sort_by_key(|a| std::cmp::Reverse((a.created_at, a.id)));
        alerts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(alerts)
    }
}

// ============================================================================
// Articles
// ============================================================================

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_article_if_new(&self, article: &Article) -> Result<Option<Article>> {
        let mut state = self.state();
        if !state.sources.contains_key(&article.source_id) {
            bail!("unknown source: {}", article.source_id);
        }

        let duplicate = state
            .articles
            .iter()
            .any(|a| a.source_id == article.source_id && a.stable_id == article.stable_id);
        if duplicate {
            return Ok(None);
        }

        state.articles.push(article.clone());
        Ok(Some(article.clone()))
    }

    async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>> {
        Ok(self
            .state()
            .articles
            .iter()
            .find(|a| a.id == article_id)
            .cloned())
    }

    async fn get_article_by_stable_id(
        &self,
        source_id: &str,
        stable_id: &str,
    ) -> Result<Option<Article>> {
        Ok(self
            .state()
            .articles
            .iter()
            .find(|a| a.source_id == source_id && a.stable_id == stable_id)
            .cloned())
    }

    async fn list_articles(&self, source_id: Option<&str>, limit: i64) -> Result<Vec<Article>> {
        let mut articles: Vec<Article> = self
            .state()
            .articles
            .iter()
            .filter(|a| source_id.map(|id| a.source_id == id).unwrap_or(true))
            .cloned()
            .collect();
        articles.sort_by_key(|a| std::cmp::Reverse((a.created_at, a.id)));
        articles.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(articles)
    }

    async fn set_article_content(
        &self,
        article_id: Uuid,
        content_text: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(article) = self.state().articles.iter_mut().find(|a| a.id == article_id) {
            article.content_text = Some(content_text.to_string());
            article.content_fetched_at = Some(fetched_at);
        }
        Ok(())
    }

    async fn set_article_summary(
        &self,
        article_id: Uuid,
        summary: &ArticleSummary,
        summarized_at: DateTime<Utc>,
    ) -> Result<()> {
        let bullets = serde_json::to_value(&summary.bullets)?;
        if let Some(article) = self.state().articles.iter_mut().find(|a| a.id == article_id) {
            article.summary_llm = Some(summary.summary.clone());
            article.summary_bullets = Some(bullets);
            article.summary_why = summary.why.clone();
            article.summary_cves = Some(summary.cves.clone());
            article.summary_model = Some(summary.model.clone());
            article.summarized_at = Some(summarized_at);
        }
        Ok(())
    }

    async fn set_article_markdown_path(&self, article_id: Uuid, path: &str) -> Result<()> {
        if let Some(article) = self.state().articles.iter_mut().find(|a| a.id == article_id) {
            article.markdown_path = Some(path.to_string());
        }
        Ok(())
    }
}

// ============================================================================
// CVEs
// ============================================================================

#[async_trait]
impl CveStore for MemoryStore {
    async fn upsert_cve(&self, record: &CveRecord) -> Result<()> {
        let mut state = self.state();
        let mut stored = record.clone();
        if let Some(existing) = state.cves.get(&record.cve_id) {
            stored.first_seen_at = existing.first_seen_at;
        }
        state.cves.insert(record.cve_id.clone(), stored);
        Ok(())
    }

    async fn get_cve(&self, cve_id: &str) -> Result<Option<CveRecord>> {
        Ok(self.state().cves.get(cve_id).cloned())
    }

    async fn latest_snapshot(&self, cve_id: &str) -> Result<Option<CveSnapshot>> {
        Ok(self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.cve_id == cve_id)
            .max_by_key(|s| (s.observed_at, s.id))
            .cloned())
    }

    async fn record_snapshot(
        &self,
        snapshot: &CveSnapshot,
        changes: &[CveChange],
    ) -> Result<Option<usize>> {
        let mut state = self.state();
        let exists = state
            .snapshots
            .iter()
            .any(|s| s.cve_id == snapshot.cve_id && s.snapshot_hash == snapshot.snapshot_hash);
        if exists {
            return Ok(None);
        }
        state.snapshots.push(snapshot.clone());
        state.changes.extend_from_slice(changes);
        Ok(Some(changes.len()))
    }

    async fn list_snapshots(&self, cve_id: &str) -> Result<Vec<CveSnapshot>> {
        let mut snapshots: Vec<CveSnapshot> = self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.cve_id == cve_id)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| (s.observed_at, s.id));
        Ok(snapshots)
    }

    async fn list_changes(&self, cve_id: Option<&str>, limit: i64) -> Result<Vec<CveChange>> {
        let mut changes: Vec<CveChange> = self
            .state()
            .changes
            .iter()
            .filter(|c| cve_id.map(|id| c.cve_id == id).unwrap_or(true))
            .cloned()
            .collect();
        changes.sort_by_key(|c| std::cmp::Reverse((c.detected_at, c.id)));
        changes.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn claim_takes_oldest_queued_job() {
        let store = MemoryStore::new();
        let first = store.enqueue("cve_sync", None, false).await.unwrap().job_id();
        let second = store.enqueue("build_site", None, false).await.unwrap().job_id();

        let claimed = store.claim_next("w1", None, None).await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.locked_by.as_deref(), Some("w1"));

        let claimed = store.claim_next("w2", None, None).await.unwrap().unwrap();
        assert_eq!(claimed.id, second);
        assert!(store.claim_next("w3", None, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_respects_allowed_types() {
        let store = MemoryStore::new();
        store.enqueue("cve_sync", None, false).await.unwrap();
        let build = store.enqueue("build_site", None, false).await.unwrap().job_id();

        let claimed = store
            .claim_next("w1", Some(&[JobType::BuildSite]), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, build);
    }

    #[tokio::test]
    async fn complete_and_fail_only_touch_running_jobs() {
        let store = MemoryStore::new();
        let id = store.enqueue("cve_sync", None, false).await.unwrap().job_id();

        assert!(!store.complete(id, "w1", serde_json::json!({})).await.unwrap());

        store.claim_next("w1", None, None).await.unwrap();
        assert!(!store.fail(id, "w2", "not my lease").await.unwrap());
        assert!(store.fail(id, "w1", "boom").await.unwrap());
        assert!(!store.complete(id, "w1", serde_json::json!({})).await.unwrap());

        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.locked_by.is_none());
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn stale_lease_is_requeued_on_claim() {
        let store = MemoryStore::new();
        let id = store.enqueue("cve_sync", None, false).await.unwrap().job_id();
        store.claim_next("w1", None, None).await.unwrap();
        assert!(store.backdate_lease(id, Duration::minutes(30)));

        let reclaimed = store
            .claim_next("w2", None, Some(Duration::minutes(15)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.locked_by.as_deref(), Some("w2"));
        assert_eq!(reclaimed.error.as_deref(), Some(STALE_LOCK_ERROR));
    }

    #[tokio::test]
    async fn article_unique_per_source_and_stable_id() {
        let store = MemoryStore::new();
        store
            .upsert_source(&Source::new("s1", "One", "https://one.example/"))
            .await
            .unwrap();

        let a = Article::new("s1", "https://one.example/a", "A", None, None).unwrap();
        let again = Article::new("s1", "https://one.example/a#top", "A", None, None).unwrap();

        assert!(store.insert_article_if_new(&a).await.unwrap().is_some());
        assert!(store.insert_article_if_new(&again).await.unwrap().is_none());
        assert_eq!(store.list_articles(Some("s1"), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_run_stamps_source() {
        let store = MemoryStore::new();
        store
            .upsert_source(&Source::new("s1", "One", "https://one.example/"))
            .await
            .unwrap();

        let mut run = SourceRun::new("s1", RunStatus::Error);
        run.error = Some("HTTP 500".into());
        store.record_run(&run).await.unwrap();

        let source = store.get_source("s1").await.unwrap().unwrap();
        assert_eq!(source.last_checked_at, Some(run.created_at));
        assert_eq!(source.last_ok_at, None);
        assert_eq!(source.last_error.as_deref(), Some("HTTP 500"));

        assert!(store.record_run(&SourceRun::new("nope", RunStatus::Ok)).await.is_err());
    }

    fn snapshot(hash: &str) -> CveSnapshot {
        CveSnapshot {
            id: Uuid::now_v7(),
            cve_id: "CVE-2024-0001".into(),
            observed_at: Utc::now(),
            last_modified_at: None,
            preferred: None,
            cvss_v31: None,
            cvss_v40: None,
            snapshot_hash: hash.into(),
        }
    }

    fn change(from: &CveSnapshot, to: &CveSnapshot) -> CveChange {
        CveChange {
            id: Uuid::now_v7(),
            cve_id: to.cve_id.clone(),
            change_type: crate::domains::cve::ChangeType::VectorChange,
            from_snapshot_id: Some(from.id),
            to_snapshot_id: Some(to.id),
            from_score: None,
            to_score: None,
            from_severity: None,
            to_severity: None,
            from_vector: None,
            to_vector: None,
            reasons: serde_json::json!({}),
            evidence: serde_json::json!({}),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn snapshot_and_changes_are_recorded_together() {
        let store = MemoryStore::new();
        let first = snapshot("aaa");
        let second = snapshot("bbb");

        assert_eq!(store.record_snapshot(&first, &[]).await.unwrap(), Some(0));
        let changes = vec![change(&first, &second)];
        assert_eq!(store.record_snapshot(&second, &changes).await.unwrap(), Some(1));

        // A repeat of a known hash writes neither the snapshot nor its changes.
        let repeat = snapshot("bbb");
        let repeat_changes = vec![change(&first, &repeat)];
        assert_eq!(store.record_snapshot(&repeat, &repeat_changes).await.unwrap(), None);

        assert_eq!(store.list_snapshots("CVE-2024-0001").await.unwrap().len(), 2);
        let stored = store.list_changes(Some("CVE-2024-0001"), 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].to_snapshot_id, Some(second.id));
    }
}
