use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Wire-level address of one HTTP API. Immutable after construction;
/// equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Endpoint {
    pub protocol: Protocol,
    pub ip_address: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol.as_str(),
            self.ip_address,
            self.port,
            self.path
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// A non-negative integer that indexes into WWW's ordered endpoint list.
/// Stable for the lifetime of one WWW instance; not portable across instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u64);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The materialised content of an Endpoint. A value, never mutated after
/// construction. `content` is expected to be an OpenAPI document (an object
/// with at minimum `info` and `paths`), but the model is agnostic to its
/// schema beyond the accessors below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPage {
    pub title: String,
    pub endpoint: Endpoint,
    pub content: serde_json::Value,
}

impl WebPage {
    /// `content.info.title`, or empty string if absent.
    pub fn info_title(&self) -> &str {
        self.content
            .get("info")
            .and_then(|i| i.get("title"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
    }

    /// `content.info.description`, or empty string if absent.
    pub fn info_description(&self) -> &str {
        self.content
            .get("info")
            .and_then(|i| i.get("description"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
    }

    /// Up to the first `limit` keys of `content.paths`, in the JSON parser's
    /// iteration order. Callers must not assume lexical order (summarisation
    /// is coarse enough to tolerate this).
    pub fn path_keys(&self, limit: usize) -> Vec<String> {
        match self.content.get("paths").and_then(|p| p.as_object()) {
            Some(map) => map.keys().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// One index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub address: Address,
    pub web_page: WebPage,
    pub summary: String,
    pub embedding: Vec<f32>,
}

/// One scored search hit, in the presentation form consumed by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub web_page_title: String,
    pub web_page: WebPage,
    pub address: Address,
    pub score: f32,
}

impl SearchResult {
    /// Descending score, tiebreak by ascending address — the ordering every
    /// returned SearchResult list must already satisfy.
    pub fn cmp_rank(a: &SearchResult, b: &SearchResult) -> Ordering {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.address.cmp(&b.address))
    }
}

/// Caller-supplied knobs for a Search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_num_results: usize,
    pub max_concurrency: usize,
    pub use_verification: bool,
    pub min_score: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_num_results: 10,
            max_concurrency: 1,
            use_verification: false,
            min_score: None,
        }
    }
}

/// Cosine similarity of two embeddings. Zero-norm on either side yields
/// `0.0`, never `NaN`.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "cosine requires equal-length vectors");
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_zero_norm_is_zero_not_nan() {
        let a = vec![0.0f32, 0.0, 0.0];
        let b = vec![1.0f32, 2.0, 3.0];
        assert_eq!(cosine(&a, &b), 0.0);
        assert_eq!(cosine(&b, &a), 0.0);
        assert_eq!(cosine(&a, &a), 0.0);
    }

    #[test]
    fn cosine_identical_vectors_is_one() {
        let a = vec![1.0f32, 2.0, 3.0];
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn search_result_tiebreak_is_ascending_address() {
        let mk = |addr: u64, score: f32| SearchResult {
            web_page_title: String::new(),
            web_page: WebPage {
                title: String::new(),
                endpoint: Endpoint {
                    protocol: Protocol::Http,
                    ip_address: "127.0.0.1".to_string(),
                    port: 80,
                    path: "/".to_string(),
                },
                content: serde_json::json!({}),
            },
            address: Address(addr),
            score,
        };
        let mut results = vec![mk(7, 0.5), mk(3, 0.5)];
        results.sort_by(SearchResult::cmp_rank);
        assert_eq!(results[0].address, Address(3));
        assert_eq!(results[1].address, Address(7));
    }

    #[test]
    fn endpoint_url_renders_protocol_host_port_path() {
        let e = Endpoint {
            protocol: Protocol::Https,
            ip_address: "10.0.0.1".to_string(),
            port: 8443,
            path: "/v1/spec".to_string(),
        };
        assert_eq!(e.url(), "https://10.0.0.1:8443/v1/spec");
    }

    proptest::proptest! {
        #[test]
        fn cosine_never_exceeds_unit_magnitude(
            a in proptest::collection::vec(-10.0f32..10.0, 1..8),
            b in proptest::collection::vec(-10.0f32..10.0, 1..8),
        ) {
            let n = a.len().min(b.len());
            let a = &a[..n];
            let b = &b[..n];
            let s = cosine(a, b);
            proptest::prop_assert!(s.is_finite());
            proptest::prop_assert!(s >= -1.0001 && s <= 1.0001);
        }
    }
}
