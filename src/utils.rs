//! Utility functions for common operations

use crate::types::{LabelSet, Timestamp};

/// Routing directive telling the routing layer which resource a request is for
pub fn routing_directive(resource: &str) -> String {
    format!("proxy_set_header X-App-Target \"{}\";", resource)
}

/// Format a label set as a `k1=v1,k2=v2` selector, sorted by key
pub fn format_label_selector(labels: &LabelSet) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` satisfies every entry of `selector`.
/// An empty selector matches everything.
pub fn selector_matches(selector: &LabelSet, labels: &LabelSet) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).map(|actual| actual == v).unwrap_or(false))
}

/// Build a label set from string pairs
pub fn label_set(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Get current Unix timestamp
pub fn current_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
