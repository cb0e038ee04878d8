use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Why the health governor paused a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "streak")]
pub enum PauseReason {
    ConsecutiveErrors(u32),
    ConsecutiveZero(u32),
}

impl PauseReason {
    /// Alert type recorded on [`HealthAlert::alert_type`].
    pub fn alert_type(&self) -> &'static str {
        match self {
            PauseReason::ConsecutiveErrors(_) => "consecutive_errors",
            PauseReason::ConsecutiveZero(_) => "consecutive_zero",
        }
    }

    pub fn streak(&self) -> u32 {
        match self {
            PauseReason::ConsecutiveErrors(n) | PauseReason::ConsecutiveZero(n) => *n,
        }
    }
}

/// Renders as `consecutive_errors:N` / `consecutive_zero:N`, the form stored
/// in `sources.paused_reason`.
impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.alert_type(), self.streak())
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    pub id: Uuid,
    pub source_id: String,
    pub alert_type: String,
    pub message: String,
    pub streak: i32,
    pub pause_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HealthAlert {
    pub fn for_pause(
        source_id: impl Into<String>,
        reason: PauseReason,
        pause_until: DateTime<Utc>,
    ) -> Self {
        let source_id = source_id.into();
        let message = match reason {
            PauseReason::ConsecutiveErrors(n) => {
                format!("source {source_id} failed {n} runs in a row; paused until {pause_until}")
            }
            PauseReason::ConsecutiveZero(n) => format!(
                "source {source_id} produced no new articles in {n} runs; paused until {pause_until}"
            ),
        };
        Self {
            id: Uuid::now_v7(),
            source_id,
            alert_type: reason.alert_type().to_string(),
            message,
            streak: i32::try_from(reason.streak()).unwrap_or(i32::MAX),
            pause_until: Some(pause_until),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_reason_display() {
        assert_eq!(
            PauseReason::ConsecutiveErrors(3).to_string(),
            "consecutive_errors:3"
        );
        assert_eq!(PauseReason::ConsecutiveZero(5).to_string(), "consecutive_zero:5");
    }

    #[test]
    fn alert_carries_reason() {
        let until = Utc::now();
        let alert = HealthAlert::for_pause("krebs", PauseReason::ConsecutiveZero(4), until);
        assert_eq!(alert.alert_type, "consecutive_zero");
        assert_eq!(alert.streak, 4);
        assert_eq!(alert.pause_until, Some(until));
        assert!(alert.message.contains("krebs"));
    }
}
