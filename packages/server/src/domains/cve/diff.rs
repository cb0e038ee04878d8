//! Classify the difference between two consecutive snapshots of one CVE.
//!
//! Rules are independent; one pair of snapshots can yield several changes.
//! Score drift that moves neither the severity band nor the vector, and the
//! removal of a v4.0 metric, produce nothing.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::models::{compare_severity, ChangeType, CveChange, CveSnapshot, CvssMetric};

pub fn diff_snapshots(
    previous: &CveSnapshot,
    current: &CveSnapshot,
    detected_at: DateTime<Utc>,
) -> Vec<CveChange> {
    let mut changes = Vec::new();
    let from = previous.preferred_metric();
    let to = current.preferred_metric();

    let change = |change_type: ChangeType,
                  from: Option<&CvssMetric>,
                  to: Option<&CvssMetric>,
                  reasons: serde_json::Value| CveChange {
        id: Uuid::now_v7(),
        cve_id: current.cve_id.clone(),
        change_type,
        from_snapshot_id: Some(previous.id),
        to_snapshot_id: Some(current.id),
        from_score: from.and_then(|m| m.score),
        to_score: to.and_then(|m| m.score),
        from_severity: from.and_then(|m| m.severity.clone()),
        to_severity: to.and_then(|m| m.severity.clone()),
        from_vector: from.and_then(|m| m.vector.clone()),
        to_vector: to.and_then(|m| m.vector.clone()),
        reasons,
        evidence: json!({
            "from_hash": previous.snapshot_hash,
            "to_hash": current.snapshot_hash,
            "from_version": from.map(|m| m.version.as_str()),
            "to_version": to.map(|m| m.version.as_str()),
            "from_last_modified_at": previous.last_modified_at,
            "to_last_modified_at": current.last_modified_at,
        }),
        detected_at,
    };

    // Severity rank
    let from_severity = from.and_then(|m| m.severity.as_deref());
    let to_severity = to.and_then(|m| m.severity.as_deref());
    if let (Some(old), Some(new)) = (from_severity, to_severity) {
        let direction = match compare_severity(old, new) {
            Some(Ordering::Greater) => Some(ChangeType::SeverityUpgrade),
            Some(Ordering::Less) => Some(ChangeType::SeverityDowngrade),
            Some(Ordering::Equal) | None => None,
        };
        if let Some(change_type) = direction {
            changes.push(change(
                change_type,
                from,
                to,
                json!({ "severity": { "from": old, "to": new } }),
            ));
        }
    }

    // Vector string, including appearing or disappearing
    let from_vector = from.and_then(|m| m.vector.as_deref());
    let to_vector = to.and_then(|m| m.vector.as_deref());
    if from_vector != to_vector {
        changes.push(change(
            ChangeType::VectorChange,
            from,
            to,
            json!({ "vector": { "from": from_vector, "to": to_vector } }),
        ));
    }

    // v4.0 newly published
    if previous.cvss_v40.is_none() {
        if let Some(v40) = current.v40_metric() {
            changes.push(change(
                ChangeType::CvssVersionAdded,
                from,
                to,
                json!({ "added_version": "4.0" }),
            ));

            let v31 = current.v31_metric().or_else(|| previous.v31_metric());
            if let Some(v31) = v31 {
                let bands = (v31.severity_rank(), v40.severity_rank());
                if let (Some(v31_band), Some(v40_band)) = bands {
                    if v31_band != v40_band {
                        changes.push(change(
                            ChangeType::PreferredSeverityDiff,
                            Some(&v31),
                            Some(&v40),
                            json!({
                                "v31_severity": v31_band,
                                "v40_severity": v40_band,
                            }),
                        ));
                    }
                }
            }
        }
    }

    changes
}
