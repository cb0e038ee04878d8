//! Health governor: per-source run streaks and automatic pausing.
//!
//! After every `ingest_source` run the governor walks the source's run
//! history newest-first. A source that keeps failing, or keeps returning
//! nothing new, is disabled for `health.pause_minutes` and a health alert is
//! appended.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::models::{HealthAlert, PauseReason, RunStatus, SourceRun};
use super::store::SourceStore;
use crate::domains::settings::{
    SettingsStore, SettingsStoreExt, HEALTH_AUTO_PAUSE, HEALTH_ERROR_THRESHOLD,
    HEALTH_PAUSE_MINUTES, HEALTH_ZERO_THRESHOLD,
};

/// How many recent runs are inspected; streaks saturate at this length.
pub const STREAK_WINDOW: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRunStreaks {
    /// Leading `error` runs
    pub consecutive_errors: u32,
    /// Leading `ok` runs that stored no new article
    pub consecutive_zero: u32,
}

/// Compute streaks from runs ordered newest-first.
pub fn compute_streaks(runs: &[SourceRun]) -> SourceRunStreaks {
    let count = |pred: fn(&SourceRun) -> bool| {
        runs.iter().take_while(|run| pred(run)).count() as u32
    };

    SourceRunStreaks {
        consecutive_errors: count(|run| run.status == RunStatus::Error),
        consecutive_zero: count(|run| run.status == RunStatus::Ok && run.accepted_count == 0),
    }
}

pub async fn get_source_run_streaks(
    sources: &dyn SourceStore,
    source_id: &str,
) -> Result<SourceRunStreaks> {
    let runs = sources.recent_runs(source_id, STREAK_WINDOW).await?;
    Ok(compute_streaks(&runs))
}

/// Thresholds read from the `health.*` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub error_threshold: u32,
    pub zero_threshold: u32,
    pub pause_minutes: i64,
    pub auto_pause: bool,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            zero_threshold: 3,
            pause_minutes: 360,
            auto_pause: true,
        }
    }
}

impl HealthPolicy {
    pub async fn load(settings: &dyn SettingsStore) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            error_threshold: settings
                .get_or(HEALTH_ERROR_THRESHOLD, defaults.error_threshold)
                .await?,
            zero_threshold: settings
                .get_or(HEALTH_ZERO_THRESHOLD, defaults.zero_threshold)
                .await?,
            pause_minutes: settings
                .get_or(HEALTH_PAUSE_MINUTES, defaults.pause_minutes)
                .await?,
            auto_pause: settings.get_or(HEALTH_AUTO_PAUSE, defaults.auto_pause).await?,
        })
    }

    /// The reason to pause, if any. A threshold of zero disables that check.
    pub fn evaluate(&self, streaks: SourceRunStreaks) -> Option<PauseReason> {
        if self.error_threshold > 0 && streaks.consecutive_errors >= self.error_threshold {
            return Some(PauseReason::ConsecutiveErrors(streaks.consecutive_errors));
        }
        if self.zero_threshold > 0 && streaks.consecutive_zero >= self.zero_threshold {
            return Some(PauseReason::ConsecutiveZero(streaks.consecutive_zero));
        }
        None
    }
}

/// Evaluate the source's streaks and pause it when a threshold is crossed.
///
/// Returns the appended alert, if the source was paused.
pub async fn apply_health_policy(
    sources: &dyn SourceStore,
    settings: &dyn SettingsStore,
    source_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<HealthAlert>> {
    let policy = HealthPolicy::load(settings).await?;
    if !policy.auto_pause {
        return Ok(None);
    }

    let streaks = get_source_run_streaks(sources, source_id).await?;
    let Some(reason) = policy.evaluate(streaks) else {
        return Ok(None);
    };

    let pause_until = now + Duration::minutes(policy.pause_minutes);
    sources
        .pause_source(source_id, pause_until, &reason.to_string())
        .await?;

    let alert = HealthAlert::for_pause(source_id, reason, pause_until);
    sources.insert_health_alert(&alert).await?;

    warn!(
        source_id,
        reason = %reason,
        pause_until = %pause_until,
        "source auto-paused"
    );
    info!(source_id, alert_id = %alert.id, "health alert recorded");

    Ok(Some(alert))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: RunStatus, accepted: i32) -> SourceRun {
        let mut run = SourceRun::new("s1", status);
        run.accepted_count = accepted;
        run
    }

    #[test]
    fn empty_history_has_no_streaks() {
        assert_eq!(compute_streaks(&[]), SourceRunStreaks::default());
    }

    #[test]
    fn leading_errors_are_counted() {
        let runs = vec![
            run(RunStatus::Error, 0),
            run(RunStatus::Error, 0),
            run(RunStatus::Ok, 2),
            run(RunStatus::Error, 0),
        ];
        let streaks = compute_streaks(&runs);
        assert_eq!(streaks.consecutive_errors, 2);
        assert_eq!(streaks.consecutive_zero, 0);
    }

    #[test]
    fn leading_zero_runs_stop_at_productive_run() {
        let runs = vec![
            run(RunStatus::Ok, 0),
            run(RunStatus::Ok, 0),
            run(RunStatus::Ok, 0),
            run(RunStatus::Ok, 1),
            run(RunStatus::Ok, 0),
        ];
        let streaks = compute_streaks(&runs);
        assert_eq!(streaks.consecutive_zero, 3);
        assert_eq!(streaks.consecutive_errors, 0);
    }

    #[test]
    fn error_breaks_zero_streak() {
        let runs = vec![run(RunStatus::Ok, 0), run(RunStatus::Error, 0), run(RunStatus::Ok, 0)];
        assert_eq!(compute_streaks(&runs).consecutive_zero, 1);
    }

    #[test]
    fn policy_thresholds() {
        let policy = HealthPolicy::default();
        assert_eq!(
            policy.evaluate(SourceRunStreaks {
                consecutive_errors: 3,
                consecutive_zero: 0
            }),
            Some(PauseReason::ConsecutiveErrors(3))
        );
        assert_eq!(
            policy.evaluate(SourceRunStreaks {
                consecutive_errors: 0,
                consecutive_zero: 4
            }),
            Some(PauseReason::ConsecutiveZero(4))
        );
        assert_eq!(
            policy.evaluate(SourceRunStreaks {
                consecutive_errors: 2,
                consecutive_zero: 0
            }),
            None
        );
    }

    #[test]
    fn zero_threshold_disables_check() {
        let policy = HealthPolicy {
            zero_threshold: 0,
            ..HealthPolicy::default()
        };
        assert_eq!(
            policy.evaluate(SourceRunStreaks {
                consecutive_errors: 0,
                consecutive_zero: 10
            }),
            None
        );
    }
}
