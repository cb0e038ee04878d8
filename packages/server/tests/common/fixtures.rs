//! Test fixtures: sources, feed items and settings.

use serde_json::{json, Value};
use vulnwatch_core::domains::cve::CveSyncSettings;
use vulnwatch_core::domains::settings::{SettingsStore, SettingsStoreExt, CVE_SYNC};
use vulnwatch_core::domains::sources::{Source, SourceStore};

pub async fn create_source(sources: &dyn SourceStore, id: &str) -> Source {
    let source = Source::new(id, format!("{id} news"), format!("https://{id}.example/"));
    sources
        .upsert_source(&source)
        .await
        .expect("Failed to create source");
    source
}

/// CVE sync settings with no sleeping between pages or retries.
pub async fn fast_cve_settings(settings: &dyn SettingsStore) -> CveSyncSettings {
    let cve_settings = CveSyncSettings {
        rate_limit_seconds: 0,
        backoff_seconds: 0,
        ..CveSyncSettings::default()
    };
    settings
        .set_typed(CVE_SYNC, &cve_settings)
        .await
        .expect("Failed to store cve.sync");
    cve_settings
}

pub fn v31(score: f64, severity: &str, vector: &str) -> Value {
    json!({
        "source": "nvd@nist.gov",
        "type": "Primary",
        "cvssData": {
            "version": "3.1",
            "baseScore": score,
            "baseSeverity": severity,
            "vectorString": vector,
        }
    })
}

pub fn v40(score: f64, severity: &str, vector: &str) -> Value {
    json!({
        "source": "cna@vendor.example",
        "type": "Secondary",
        "cvssData": {
            "version": "4.0",
            "baseScore": score,
            "baseSeverity": severity,
            "vectorString": vector,
        }
    })
}

/// One `vulnerabilities[]` entry in feed format.
pub fn cve_item(id: &str, last_modified: &str, v31: Option<Value>, v40: Option<Value>) -> Value {
    let mut metrics = serde_json::Map::new();
    if let Some(v31) = v31 {
        metrics.insert("cvssMetricV31".to_string(), json!([v31]));
    }
    if let Some(v40) = v40 {
        metrics.insert("cvssMetricV40".to_string(), json!([v40]));
    }

    json!({
        "cve": {
            "id": id,
            "published": "2024-05-01T12:00:00.000",
            "lastModified": last_modified,
            "descriptions": [
                { "lang": "en", "value": format!("Remote code execution in Acme Gateway ({id})") }
            ],
            "metrics": metrics,
            "configurations": [{
                "nodes": [{
                    "cpeMatch": [
                        { "vulnerable": true, "criteria": "cpe:2.3:a:acme:gateway:2.1:*:*:*:*:*:*:*" }
                    ]
                }]
            }],
            "references": [{ "url": "https://security.acme.example/advisories/1" }]
        }
    })
}

pub const VECTOR_A: &str = "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H";
pub const VECTOR_B: &str = "CVSS:3.1/AV:N/AC:H/PR:N/UI:N/S:U/C:H/I:H/A:H";
pub const VECTOR_V4: &str = "CVSS:4.0/AV:N/AC:L/AT:N/PR:N/UI:N/VC:H/VI:H/VA:H/SC:N/SI:N/SA:N";
