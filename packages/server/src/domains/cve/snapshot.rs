//! Content-addressed CVE snapshots.
//!
//! A snapshot covers only the scoring state (`preferred`, raw v3.1 and v4.0
//! payloads, `last_modified_at`). Re-observing identical content yields the
//! same hash, which the store uses to skip the insert.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use sqlx::types::Json;
use uuid::Uuid;

use super::extract::ExtractedCve;
use super::models::CveSnapshot;
use crate::common::utils::sha256_hex;

/// Serialize with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// `sha256(canonical {preferred, cvss_v31, cvss_v40, last_modified_at})`.
pub fn snapshot_hash(
    preferred: Option<&Value>,
    cvss_v31: Option<&Value>,
    cvss_v40: Option<&Value>,
    last_modified_at: Option<DateTime<Utc>>,
) -> String {
    let material = json!({
        "preferred": preferred.cloned().unwrap_or(Value::Null),
        "cvss_v31": cvss_v31.cloned().unwrap_or(Value::Null),
        "cvss_v40": cvss_v40.cloned().unwrap_or(Value::Null),
        "last_modified_at": last_modified_at
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
    });
    sha256_hex(canonical_json(&material).as_bytes())
}

/// Build the snapshot row for an extracted item observed at `observed_at`.
pub fn build_snapshot(cve: &ExtractedCve, observed_at: DateTime<Utc>) -> CveSnapshot {
    let preferred = cve
        .preferred
        .as_ref()
        .and_then(|metric| serde_json::to_value(metric).ok());

    let hash = snapshot_hash(
        preferred.as_ref(),
        cve.cvss_v31.as_ref(),
        cve.cvss_v40.as_ref(),
        cve.last_modified_at,
    );

    CveSnapshot {
        id: Uuid::now_v7(),
        cve_id: cve.cve_id.clone(),
        observed_at,
        last_modified_at: cve.last_modified_at,
        preferred: cve.preferred.clone().map(Json),
        cvss_v31: cve.cvss_v31.clone(),
        cvss_v40: cve.cvss_v40.clone(),
        snapshot_hash: hash,
    }
}
