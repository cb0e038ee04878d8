use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A feed or page polled by `ingest_source`.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub url: String,
    pub kind: String,
    pub interval_minutes: i32,
    pub pause_until: Option<DateTime<Utc>>,
    pub paused_reason: Option<String>,
    pub tags: Vec<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_ok_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// New enabled HTML source with the default hourly interval.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            url: url.into(),
            kind: "html".to_string(),
            interval_minutes: 60,
            pause_until: None,
            paused_reason: None,
            tags: Vec::new(),
            last_checked_at: None,
            last_ok_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Paused sources are skipped by scheduling even when enabled.
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.pause_until.map(|until| until > now).unwrap_or(false)
    }

    /// Enabled, not paused, and not checked within its interval.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || self.is_paused(now) {
            return false;
        }
        match self.last_checked_at {
            None => true,
            Some(checked) => checked <= now - Duration::minutes(i64::from(self.interval_minutes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_checked_source_is_due() {
        let source = Source::new("krebs", "Krebs", "https://krebsonsecurity.com");
        assert!(source.is_due(Utc::now()));
    }

    #[test]
    fn recently_checked_source_is_not_due() {
        let now = Utc::now();
        let mut source = Source::new("krebs", "Krebs", "https://krebsonsecurity.com");
        source.last_checked_at = Some(now - Duration::minutes(10));
        assert!(!source.is_due(now));

        source.last_checked_at = Some(now - Duration::minutes(61));
        assert!(source.is_due(now));
    }

    #[test]
    fn paused_source_is_not_due_even_if_enabled() {
        let now = Utc::now();
        let mut source = Source::new("krebs", "Krebs", "https://krebsonsecurity.com");
        source.pause_until = Some(now + Duration::hours(1));
        assert!(source.is_paused(now));
        assert!(!source.is_due(now));

        source.pause_until = Some(now - Duration::minutes(1));
        assert!(!source.is_paused(now));
        assert!(source.is_due(now));
    }

    #[test]
    fn disabled_source_is_not_due() {
        let mut source = Source::new("krebs", "Krebs", "https://krebsonsecurity.com");
        source.enabled = false;
        assert!(!source.is_due(Utc::now()));
    }
}
