use std::fmt;

use super::extract::ExtractedCve;
use super::settings::CveSyncSettings;

/// Why an item was dropped by the sync filters.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterReason {
    UnknownScore,
    BelowMinCvss { score: f64, min: f64 },
    SeverityNotSelected(Option<String>),
    NoVendorMatch,
    NoProductMatch,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::UnknownScore => f.write_str("no known CVSS score"),
            FilterReason::BelowMinCvss { score, min } => {
                write!(f, "score {score} below minimum {min}")
            }
            FilterReason::SeverityNotSelected(Some(severity)) => {
                write!(f, "severity {severity} not selected")
            }
            FilterReason::SeverityNotSelected(None) => f.write_str("no severity to match"),
            FilterReason::NoVendorMatch => f.write_str("no vendor keyword matched"),
            FilterReason::NoProductMatch => f.write_str("no product keyword matched"),
        }
    }
}

/// Filters from the `cve.sync` setting, normalized for matching.
///
/// Keyword filters are case-insensitive substring searches over the
/// description plus extracted signals. Vendor and product keyword lists
/// must both match when both are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CveFilters {
    pub min_cvss: Option<f64>,
    pub severities: Vec<String>,
    pub require_known_score: bool,
    pub vendor_keywords: Vec<String>,
    pub product_keywords: Vec<String>,
}

impl From<&CveSyncSettings> for CveFilters {
    fn from(settings: &CveSyncSettings) -> Self {
        Self {
            min_cvss: settings.min_cvss,
            severities: normalize(&settings.severities, str::to_ascii_uppercase),
            require_known_score: settings.require_known_score,
            vendor_keywords: normalize(&settings.vendor_keywords, str::to_lowercase),
            product_keywords: normalize(&settings.product_keywords, str::to_lowercase),
        }
    }
}

fn normalize(values: &[String], case: fn(&str) -> String) -> Vec<String> {
    values
        .iter()
        .map(|v| case(v.trim()))
        .filter(|v| !v.is_empty())
        .collect()
}

impl CveFilters {
    pub fn is_empty(&self) -> bool {
        self.min_cvss.is_none()
            && self.severities.is_empty()
            && !self.require_known_score
            && self.vendor_keywords.is_empty()
            && self.product_keywords.is_empty()
    }

    pub fn check(&self, cve: &ExtractedCve) -> Result<(), FilterReason> {
        let score = cve.preferred_score();

        if self.require_known_score && score.is_none() {
            return Err(FilterReason::UnknownScore);
        }

        if let (Some(min), Some(score)) = (self.min_cvss, score) {
            if score < min {
                return Err(FilterReason::BelowMinCvss { score, min });
            }
        }

        if !self.severities.is_empty() {
            let severity = cve.preferred_severity().map(str::to_ascii_uppercase);
            let selected = severity
                .as_ref()
                .map(|s| self.severities.contains(s))
                .unwrap_or(false);
            if !selected {
                return Err(FilterReason::SeverityNotSelected(severity));
            }
        }

        if self.vendor_keywords.is_empty() && self.product_keywords.is_empty() {
            return Ok(());
        }

        let haystack = cve.haystack();
        let matches = |keywords: &[String]| keywords.iter().any(|k| haystack.contains(k.as_str()));

        if !self.vendor_keywords.is_empty() && !matches(&self.vendor_keywords) {
            return Err(FilterReason::NoVendorMatch);
        }
        if !self.product_keywords.is_empty() && !matches(&self.product_keywords) {
            return Err(FilterReason::NoProductMatch);
        }

        Ok(())
    }
}
