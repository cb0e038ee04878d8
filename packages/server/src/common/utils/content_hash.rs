use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters that only carry campaign tracking.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid"];

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Normalize an article URL for duplicate detection.
///
/// Normalization rules:
/// - Lowercase scheme and host, drop the default port (done by `Url::parse`)
/// - Drop the fragment
/// - Drop tracking parameters (`utm_*`, `fbclid`, `gclid`, `mc_cid`, `mc_eid`)
/// - Sort the remaining query pairs
/// - Strip a trailing `/` from non-root paths
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url =
        Url::parse(raw.trim()).with_context(|| format!("invalid article URL: {raw}"))?;

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Stable article identity: SHA-256 of the normalized URL.
pub fn stable_id_for_url(raw: &str) -> Result<String> {
    let normalized = normalize_url(raw)?;
    Ok(sha256_hex(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_and_host_lowercased() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Post").unwrap(),
            "https://example.com/Post"
        );
    }

    #[test]
    fn test_default_port_and_fragment_dropped() {
        assert_eq!(
            normalize_url("https://example.com:443/a#comments").unwrap(),
            "https://example.com/a"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/a").unwrap(),
            "http://example.com:8080/a"
        );
    }

    #[test]
    fn test_tracking_params_removed_and_query_sorted() {
        assert_eq!(
            normalize_url("https://example.com/a?utm_source=x&b=2&fbclid=abc&a=1&UTM_medium=y")
                .unwrap(),
            "https://example.com/a?a=1&b=2"
        );
        assert_eq!(
            normalize_url("https://example.com/a?utm_source=x").unwrap(),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/news/").unwrap(),
            "https://example.com/news"
        );
        assert_eq!(
            normalize_url("https://example.com/").unwrap(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_equivalent_urls_share_stable_id() {
        let a = stable_id_for_url("https://Example.com/post/?utm_campaign=z#top").unwrap();
        let b = stable_id_for_url("https://example.com/post").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, stable_id_for_url("https://example.com/other").unwrap());
    }

    #[test]
    fn test_hash_format() {
        let hash = sha256_hex(b"Test content");

        // SHA256 hash should be 64 hex characters
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(stable_id_for_url("not a url").is_err());
    }
}
