//! End-to-end pipeline runs through the real registry with mock
//! collaborators: ingest → fetch content → (summarize) → markdown.

mod common;

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use vulnwatch_core::domains::articles::Article;
use vulnwatch_core::domains::pipeline::{
    build_job_registry, BuildSiteJob, IngestDueSourcesJob, IngestSourceJob,
};
use vulnwatch_core::domains::settings::{LLM_SUMMARIZE, PIPELINE_FETCH_FULL_CONTENT};
use vulnwatch_core::kernel::jobs::testing::{run_all_jobs, test_runner};
use vulnwatch_core::kernel::jobs::{JobOutcome, JobQueueExt, JobStatus, JobType};
use vulnwatch_core::kernel::test_dependencies::{
    MockContentFetcher, MockIngestor, MockSiteBuilder, MockSummarizer,
};
use vulnwatch_core::kernel::{MarkdownPublisher, TestDependencies};

use crate::common::{create_source, PipelineHarness};

fn alpha_ingestor() -> MockIngestor {
    MockIngestor::new().with_articles(
        "alpha",
        vec![
            ("https://alpha.example/2024/05/router-zero-day", "Router zero-day exploited in the wild"),
            ("https://alpha.example/2024/05/patch-roundup", "Patch roundup for May"),
        ],
    )
}

#[tokio::test]
async fn ingest_to_markdown_without_llm() {
    let harness = PipelineHarness::new(TestDependencies::new().mock_ingestor(alpha_ingestor()));
    create_source(harness.deps.sources.as_ref(), "alpha").await;

    harness
        .deps
        .jobs
        .enqueue_job(IngestDueSourcesJob::default())
        .await
        .unwrap();
    let outcomes = harness.run_all().await;
    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.iter().all(|o| matches!(o, JobOutcome::Succeeded(_))));

    assert_eq!(harness.assert_all(JobType::IngestDueSources, JobStatus::Succeeded).len(), 1);
    assert_eq!(harness.assert_all(JobType::IngestSource, JobStatus::Succeeded).len(), 1);
    assert_eq!(harness.assert_all(JobType::FetchArticleContent, JobStatus::Succeeded).len(), 2);
    assert_eq!(harness.assert_all(JobType::WriteArticleMarkdown, JobStatus::Succeeded).len(), 2);
    assert!(harness.jobs_of_type(JobType::SummarizeArticleLlm).is_empty());

    let ingest = &harness.jobs_of_type(JobType::IngestSource)[0];
    let result = ingest.result.as_ref().unwrap();
    assert_eq!(result["accepted"], json!(2));
    assert_eq!(result["status"], json!("ok"));

    let articles = harness.deps.articles.list_articles(Some("alpha"), 10).await.unwrap();
    assert_eq!(articles.len(), 2);
    for article in &articles {
        assert!(article.has_content());
        assert!(!article.has_llm_summary());
        assert_eq!(
            article.markdown_path.as_deref(),
            Some(format!("mock://posts/{}.md", article.stable_id).as_str())
        );
    }

    let published = harness.test_deps.publisher.calls();
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|c| !c.had_llm_summary));
}

#[tokio::test]
async fn repeated_ingest_never_duplicates_articles() {
    let ingestor = alpha_ingestor().with_articles(
        "alpha",
        vec![
            ("https://alpha.example/2024/05/router-zero-day/", "Router zero-day exploited in the wild"),
            ("https://alpha.example/2024/05/patch-roundup?utm_source=feed", "Patch roundup for May"),
            ("https://alpha.example/2024/05/new-advisory", "A brand new advisory"),
        ],
    );
    let harness = PipelineHarness::new(TestDependencies::new().mock_ingestor(ingestor));
    create_source(harness.deps.sources.as_ref(), "alpha").await;

    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;

    // Source was just checked, so it is not due again yet
    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;
    assert_eq!(harness.jobs_of_type(JobType::IngestSource).len(), 1);

    assert!(harness.store().backdate_source_check("alpha", Duration::hours(2)));
    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;

    let articles = harness.deps.articles.list_articles(Some("alpha"), 10).await.unwrap();
    assert_eq!(articles.len(), 3);
    assert_eq!(harness.jobs_of_type(JobType::WriteArticleMarkdown).len(), 3);

    let latest = &harness.deps.sources.recent_runs("alpha", 1).await.unwrap()[0];
    assert_eq!(latest.accepted_count, 1);
    assert_eq!(latest.skipped_duplicate, 2);
}

#[tokio::test]
async fn rerun_after_crash_rechains_stored_articles() {
    let ingestor = alpha_ingestor().with_articles(
        "alpha",
        vec![
            ("https://alpha.example/2024/05/router-zero-day", "Router zero-day exploited in the wild"),
            ("https://alpha.example/2024/05/patch-roundup", "Patch roundup for May"),
        ],
    );
    let harness = PipelineHarness::new(TestDependencies::new().mock_ingestor(ingestor));
    create_source(harness.deps.sources.as_ref(), "alpha").await;

    // An earlier attempt stored this article, then died before enqueueing its fetch.
    let stranded = Article::new(
        "alpha",
        "https://alpha.example/2024/05/router-zero-day",
        "Router zero-day exploited in the wild",
        None,
        None,
    )
    .unwrap();
    harness.deps.articles.insert_article_if_new(&stranded).await.unwrap().unwrap();

    harness.deps.jobs.enqueue_job(IngestSourceJob::new("alpha")).await.unwrap();
    harness.run_all().await;

    let result = harness.jobs_of_type(JobType::IngestSource)[0].result.clone().unwrap();
    assert_eq!(result["accepted"], json!(1));
    assert_eq!(result["skipped_duplicate"], json!(1));
    assert_eq!(result["resumed"], json!(1));

    assert_eq!(harness.assert_all(JobType::FetchArticleContent, JobStatus::Succeeded).len(), 2);
    assert_eq!(harness.assert_all(JobType::WriteArticleMarkdown, JobStatus::Succeeded).len(), 2);
    let stored = harness.deps.articles.get_article(stranded.id).await.unwrap().unwrap();
    assert!(stored.markdown_path.is_some());

    // Once written, a duplicate is left alone.
    harness.deps.jobs.enqueue_job(IngestSourceJob::new("alpha")).await.unwrap();
    harness.run_all().await;
    assert_eq!(harness.jobs_of_type(JobType::FetchArticleContent).len(), 2);
    let rerun = harness.jobs_of_type(JobType::IngestSource)[1].result.clone().unwrap();
    assert_eq!(rerun["skipped_duplicate"], json!(2));
    assert_eq!(rerun["resumed"], json!(0));
}

#[tokio::test]
async fn llm_route_adds_summarize_stage() {
    let harness = PipelineHarness::new(
        TestDependencies::new()
            .mock_ingestor(alpha_ingestor())
            .mock_summarizer(MockSummarizer::new()),
    );
    create_source(harness.deps.sources.as_ref(), "alpha").await;
    harness
        .deps
        .settings
        .set_setting(
            LLM_SUMMARIZE,
            json!({ "enabled": true, "provider": "openai", "model": "gpt-5-mini" }),
        )
        .await
        .unwrap();

    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;

    assert_eq!(harness.assert_all(JobType::SummarizeArticleLlm, JobStatus::Succeeded).len(), 2);
    assert_eq!(harness.assert_all(JobType::WriteArticleMarkdown, JobStatus::Succeeded).len(), 2);

    let summarizer = harness.test_deps.summarizer.as_ref().unwrap();
    assert_eq!(summarizer.call_count(), 2);
    assert!(summarizer
        .calls()
        .iter()
        .all(|r| r.content.starts_with("# Mock Content")));

    let published = harness.test_deps.publisher.calls();
    assert!(published.iter().all(|c| c.had_llm_summary));
}

#[tokio::test]
async fn llm_route_without_summarizer_goes_straight_to_markdown() {
    let harness = PipelineHarness::new(TestDependencies::new().mock_ingestor(alpha_ingestor()));
    create_source(harness.deps.sources.as_ref(), "alpha").await;
    harness
        .deps
        .settings
        .set_setting(LLM_SUMMARIZE, json!({ "enabled": true, "provider": "openai" }))
        .await
        .unwrap();

    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;

    assert!(harness.jobs_of_type(JobType::SummarizeArticleLlm).is_empty());
    assert_eq!(harness.assert_all(JobType::WriteArticleMarkdown, JobStatus::Succeeded).len(), 2);
}

#[tokio::test]
async fn content_fetch_disabled_skips_fetch_stage() {
    let harness = PipelineHarness::new(TestDependencies::new().mock_ingestor(alpha_ingestor()));
    create_source(harness.deps.sources.as_ref(), "alpha").await;
    harness
        .deps
        .settings
        .set_setting(PIPELINE_FETCH_FULL_CONTENT, json!(false))
        .await
        .unwrap();

    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;

    assert!(harness.jobs_of_type(JobType::FetchArticleContent).is_empty());
    assert!(harness.test_deps.content_fetcher.calls().is_empty());

    let articles = harness.deps.articles.list_articles(Some("alpha"), 10).await.unwrap();
    assert!(articles.iter().all(|a| a.markdown_path.is_some() && !a.has_content()));
}

#[tokio::test]
async fn failed_fetch_fails_only_that_article() {
    let harness = PipelineHarness::new(
        TestDependencies::new()
            .mock_ingestor(alpha_ingestor())
            .mock_content_fetcher(
                MockContentFetcher::new()
                    .with_failure("https://alpha.example/2024/05/patch-roundup"),
            ),
    );
    create_source(harness.deps.sources.as_ref(), "alpha").await;

    harness.deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    harness.run_all().await;

    let fetches = harness.jobs_of_type(JobType::FetchArticleContent);
    let failed: Vec<_> = fetches.iter().filter(|j| j.status == JobStatus::Failed).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("HTTP 503"));
    assert_eq!(harness.assert_all(JobType::WriteArticleMarkdown, JobStatus::Succeeded).len(), 1);
}

#[tokio::test]
async fn markdown_files_land_in_content_dir() {
    let dir = tempfile::tempdir().unwrap();
    let test_deps = TestDependencies::new().mock_ingestor(alpha_ingestor());
    let mut deps = (*test_deps.clone().into_deps()).clone();
    deps.publisher = Arc::new(MarkdownPublisher::new(dir.path()));
    let deps = Arc::new(deps);
    let runner = test_runner(build_job_registry(), deps.clone(), "w1");

    create_source(deps.sources.as_ref(), "alpha").await;
    deps.jobs.enqueue_job(IngestDueSourcesJob::default()).await.unwrap();
    run_all_jobs(&runner).await.unwrap();

    let articles = deps.articles.list_articles(Some("alpha"), 10).await.unwrap();
    assert_eq!(articles.len(), 2);
    for article in &articles {
        let path = article.markdown_path.as_deref().unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.starts_with("---\n"));
        assert!(body.contains(&format!("stable_id: {}", article.stable_id)));
        assert!(body.contains("Full text of"));
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn build_site_runs_the_builder_once_per_job() {
    let harness = PipelineHarness::new(TestDependencies::new().mock_site_builder(MockSiteBuilder::new()));

    harness.deps.jobs.enqueue_job(BuildSiteJob::default()).await.unwrap();
    harness.deps.jobs.enqueue_job(BuildSiteJob::default()).await.unwrap();
    harness.run_all().await;

    let builds = harness.assert_all(JobType::BuildSite, JobStatus::Succeeded);
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].result.as_ref().unwrap()["output"], json!("mock site built"));
    assert_eq!(harness.test_deps.site_builder.build_count(), 1);
}
