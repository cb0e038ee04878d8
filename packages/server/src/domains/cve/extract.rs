//! Signal extraction from raw vulnerability feed items.
//!
//! Input is one element of the feed's `vulnerabilities` array, i.e.
//! `{"cve": {...}}` (a bare `cve` object is accepted too). Everything the
//! sync engine needs for filtering, upserting and snapshotting is pulled out
//! here so the rest of the pipeline never touches raw feed JSON.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;

use super::models::{AffectedProduct, CveRecord, CvssMetric};

/// Everything extracted from one feed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCve {
    pub cve_id: String,
    pub published_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    /// First `cvssMetricV31` entry, verbatim
    pub cvss_v31: Option<Value>,
    /// First `cvssMetricV40` entry, verbatim
    pub cvss_v40: Option<Value>,
    pub preferred: Option<CvssMetric>,
    pub signals: CveSignals,
}

/// Vendor/product/reference signals used by keyword filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CveSignals {
    pub vendors: Vec<String>,
    pub products: Vec<String>,
    pub cpes: Vec<String>,
    pub affected: Vec<AffectedProduct>,
    pub reference_domains: Vec<String>,
}

impl CveSignals {
    /// Lowercased text searched by keyword filters, one signal per line.
    pub fn search_text(&self) -> String {
        let affected = self
            .affected
            .iter()
            .map(|a| format!("{} {} {}", a.vendor, a.product, a.version));

        self.vendors
            .iter()
            .chain(&self.products)
            .chain(&self.cpes)
            .cloned()
            .chain(affected)
            .chain(self.reference_domains.iter().cloned())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase()
    }
}

impl ExtractedCve {
    /// Lowercased description plus signal text.
    pub fn haystack(&self) -> String {
        let description = self.description.as_deref().unwrap_or("").to_lowercase();
        format!("{description}\n{}", self.signals.search_text())
    }

    pub fn preferred_score(&self) -> Option<f64> {
        self.preferred.as_ref().and_then(|p| p.score)
    }

    pub fn preferred_severity(&self) -> Option<&str> {
        self.preferred.as_ref().and_then(|p| p.severity.as_deref())
    }

    /// Current-state row. `first_seen_at` is only honored on first insert.
    pub fn to_record(&self, now: DateTime<Utc>) -> CveRecord {
        let preferred = self.preferred.as_ref();
        CveRecord {
            cve_id: self.cve_id.clone(),
            published_at: self.published_at,
            last_modified_at: self.last_modified_at,
            description: self.description.clone(),
            preferred_version: preferred.map(|p| p.version.clone()),
            preferred_score: preferred.and_then(|p| p.score),
            preferred_severity: preferred.and_then(|p| p.severity.clone()),
            preferred_vector: preferred.and_then(|p| p.vector.clone()),
            cvss_v31: self.cvss_v31.clone(),
            cvss_v40: self.cvss_v40.clone(),
            vendors: self.signals.vendors.clone(),
            products: self.signals.products.clone(),
            cpes: self.signals.cpes.clone(),
            affected: Json(self.signals.affected.clone()),
            reference_domains: self.signals.reference_domains.clone(),
            first_seen_at: now,
            updated_at: now,
        }
    }
}

/// Extract a feed item; `None` when it carries no CVE id.
pub fn extract_cve(item: &Value, prefer_v4: bool) -> Option<ExtractedCve> {
    let cve = item.get("cve").unwrap_or(item);

    let cve_id = cve
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())?
        .to_string();

    let metrics = cve.get("metrics");
    let cvss_v31 = first_metric(metrics, "cvssMetricV31");
    let cvss_v40 = first_metric(metrics, "cvssMetricV40");

    let v31 = cvss_v31.as_ref().map(|raw| CvssMetric::from_feed("3.1", raw));
    let v40 = cvss_v40.as_ref().map(|raw| CvssMetric::from_feed("4.0", raw));

    Some(ExtractedCve {
        cve_id,
        published_at: parse_timestamp(cve.get("published")),
        last_modified_at: parse_timestamp(cve.get("lastModified")),
        description: pick_description(cve.get("descriptions").or_else(|| cve.get("description"))),
        cvss_v31,
        cvss_v40,
        preferred: choose_preferred(v31, v40, prefer_v4),
        signals: extract_signals(cve),
    })
}

fn first_metric(metrics: Option<&Value>, key: &str) -> Option<Value> {
    metrics?
        .get(key)?
        .as_array()?
        .first()
        .cloned()
}

/// v4.0 when preferred and present, else v3.1, else v4.0, else nothing.
pub fn choose_preferred(
    v31: Option<CvssMetric>,
    v40: Option<CvssMetric>,
    prefer_v4: bool,
) -> Option<CvssMetric> {
    match (v31, v40) {
        (_, Some(v40)) if prefer_v4 => Some(v40),
        (Some(v31), _) => Some(v31),
        (None, v40) => v40,
    }
}

/// English text preferred, else the first entry.
///
/// Accepts, in priority order: a plain string, a single `{lang, value}`
/// object, or a list of such objects.
pub fn pick_description(node: Option<&Value>) -> Option<String> {
    let text = match node? {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => node?.get("value").and_then(Value::as_str).map(str::to_string),
        Value::Array(entries) => {
            let english = entries.iter().find(|entry| {
                entry
                    .get("lang")
                    .and_then(Value::as_str)
                    .map(|lang| lang.eq_ignore_ascii_case("en") || lang.to_lowercase().starts_with("en-"))
                    .unwrap_or(false)
            });
            english
                .or_else(|| entries.first())
                .and_then(|entry| match entry {
                    Value::String(s) => Some(s.clone()),
                    other => other.get("value").and_then(Value::as_str).map(str::to_string),
                })
        }
        _ => None,
    };

    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Feed timestamps come either as RFC 3339 or as naive UTC
/// (`2024-03-01T12:00:00.000`).
pub fn parse_timestamp(node: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = node?.as_str()?.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn extract_signals(cve: &Value) -> CveSignals {
    let mut cpes = BTreeSet::new();
    let mut affected = BTreeSet::new();

    if let Some(configurations) = cve.get("configurations").and_then(Value::as_array) {
        for configuration in configurations {
            let nodes = configuration.get("nodes").and_then(Value::as_array);
            for node in nodes.into_iter().flatten() {
                walk_node(node, &mut cpes, &mut affected);
            }
        }
    }

    let vendors: BTreeSet<String> = affected.iter().map(|a: &AffectedProduct| a.vendor.clone()).collect();
    let products: BTreeSet<String> = affected.iter().map(|a| a.product.clone()).collect();

    let reference_domains: BTreeSet<String> = cve
        .get("references")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|reference| reference.get("url").and_then(Value::as_str))
        .filter_map(|raw| url::Url::parse(raw).ok())
        .filter_map(|url| url.host_str().map(|host| host.to_lowercase()))
        .collect();

    CveSignals {
        vendors: vendors.into_iter().collect(),
        products: products.into_iter().collect(),
        cpes: cpes.into_iter().collect(),
        affected: affected.into_iter().collect(),
        reference_domains: reference_domains.into_iter().collect(),
    }
}

/// Depth-first over a configuration node and its `children`.
fn walk_node(node: &Value, cpes: &mut BTreeSet<String>, affected: &mut BTreeSet<AffectedProduct>) {
    let matches = node
        .get("cpeMatch")
        .or_else(|| node.get("cpe_match"))
        .and_then(Value::as_array);

    for cpe_match in matches.into_iter().flatten() {
        let criteria = cpe_match
            .get("criteria")
            .or_else(|| cpe_match.get("cpe23Uri"))
            .and_then(Value::as_str);
        if let Some(criteria) = criteria {
            cpes.insert(criteria.to_string());
            if let Some(product) = parse_cpe(criteria) {
                affected.insert(product);
            }
        }
    }

    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            walk_node(child, cpes, affected);
        }
    }
}

/// `cpe:2.3:<part>:<vendor>:<product>:<version>:...`
pub fn parse_cpe(cpe: &str) -> Option<AffectedProduct> {
    let parts: Vec<&str> = cpe.split(':').collect();
    if parts.len() < 6 || parts[0] != "cpe" {
        return None;
    }
    let vendor = parts[3];
    let product = parts[4];
    if vendor.is_empty() || product.is_empty() || vendor == "*" || product == "*" {
        return None;
    }
    Some(AffectedProduct {
        vendor: vendor.to_lowercase(),
        product: product.to_lowercase(),
        version: parts[5].to_string(),
    })
}
