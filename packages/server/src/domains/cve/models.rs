use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Severity
// ============================================================================

/// Qualitative CVSS severity, ordered `NONE < LOW < MEDIUM < HIGH < CRITICAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Band for a CVSS base score (v3.x and v4.0 share the same bands).
    pub fn from_score(score: f64) -> Option<Self> {
        if !(0.0..=10.0).contains(&score) {
            return None;
        }
        Some(match score {
            s if s == 0.0 => Severity::None,
            s if s < 4.0 => Severity::Low,
            s if s < 7.0 => Severity::Medium,
            s if s < 9.0 => Severity::High,
            _ => Severity::Critical,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "NONE",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Severity::None),
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Compare two severity labels by rank; `None` if either is unranked.
pub fn compare_severity(from: &str, to: &str) -> Option<Ordering> {
    let from: Severity = from.parse().ok()?;
    let to: Severity = to.parse().ok()?;
    Some(to.cmp(&from))
}

// ============================================================================
// CVSS metric
// ============================================================================

/// Normalized view of one CVSS metric entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvssMetric {
    /// `"3.1"` or `"4.0"`
    pub version: String,
    pub score: Option<f64>,
    /// Uppercase label; derived from the score band when the feed omits it
    pub severity: Option<String>,
    pub vector: Option<String>,
}

impl CvssMetric {
    /// Normalize a raw feed metric entry (`{cvssData: {...}, ...}`).
    pub fn from_feed(version: &str, raw: &serde_json::Value) -> Self {
        let data = raw.get("cvssData").unwrap_or(raw);

        let score = data.get("baseScore").and_then(serde_json::Value::as_f64);
        let severity = data
            .get("baseSeverity")
            .or_else(|| raw.get("baseSeverity"))
            .and_then(serde_json::Value::as_str)
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .or_else(|| score.and_then(Severity::from_score).map(|s| s.to_string()));
        let vector = data
            .get("vectorString")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        Self {
            version: data
                .get("version")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(version)
                .to_string(),
            score,
            severity,
            vector,
        }
    }

    pub fn severity_rank(&self) -> Option<Severity> {
        self.severity.as_deref().and_then(|s| s.parse().ok())
    }
}

/// A `(vendor, product, version)` triple taken from a CPE match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AffectedProduct {
    pub vendor: String,
    pub product: String,
    pub version: String,
}

// ============================================================================
// Rows
// ============================================================================

/// Current state of one CVE, upserted on every sync pass.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveRecord {
    pub cve_id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub preferred_version: Option<String>,
    pub preferred_score: Option<f64>,
    pub preferred_severity: Option<String>,
    pub preferred_vector: Option<String>,
    pub cvss_v31: Option<serde_json::Value>,
    pub cvss_v40: Option<serde_json::Value>,
    pub vendors: Vec<String>,
    pub products: Vec<String>,
    pub cpes: Vec<String>,
    pub affected: Json<Vec<AffectedProduct>>,
    pub reference_domains: Vec<String>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable, content-addressed observation of a CVE's scoring state.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveSnapshot {
    pub id: Uuid,
    pub cve_id: String,
    pub observed_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub preferred: Option<Json<CvssMetric>>,
    pub cvss_v31: Option<serde_json::Value>,
    pub cvss_v40: Option<serde_json::Value>,
    pub snapshot_hash: String,
}

impl CveSnapshot {
    pub fn preferred_metric(&self) -> Option<&CvssMetric> {
        self.preferred.as_ref().map(|json| &json.0)
    }

    pub fn v31_metric(&self) -> Option<CvssMetric> {
        self.cvss_v31
            .as_ref()
            .map(|raw| CvssMetric::from_feed("3.1", raw))
    }

    pub fn v40_metric(&self) -> Option<CvssMetric> {
        self.cvss_v40
            .as_ref()
            .map(|raw| CvssMetric::from_feed("4.0", raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cve_change_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    SeverityUpgrade,
    SeverityDowngrade,
    VectorChange,
    CvssVersionAdded,
    PreferredSeverityDiff,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::SeverityUpgrade => "severity_upgrade",
            ChangeType::SeverityDowngrade => "severity_downgrade",
            ChangeType::VectorChange => "vector_change",
            ChangeType::CvssVersionAdded => "cvss_version_added",
            ChangeType::PreferredSeverityDiff => "preferred_severity_diff",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified difference between two consecutive snapshots.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveChange {
    pub id: Uuid,
    pub cve_id: String,
    pub change_type: ChangeType,
    pub from_snapshot_id: Option<Uuid>,
    pub to_snapshot_id: Option<Uuid>,
    pub from_score: Option<f64>,
    pub to_score: Option<f64>,
    pub from_severity: Option<String>,
    pub to_severity: Option<String>,
    pub from_vector: Option<String>,
    pub to_vector: Option<String>,
    pub reasons: serde_json::Value,
    pub evidence: serde_json::Value,
    pub detected_at: DateTime<Utc>,
}
