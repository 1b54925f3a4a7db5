//! Utility functions for the search store repository.

use url::form_urlencoded::byte_serialize;

/// Returns true if `address` matches more than one collection.
///
/// Writes must name exactly one index or alias, so wildcard patterns and
/// comma separated lists are refused.
///
/// # Example
///
/// ```
/// use search_store_repository::utils::is_wildcard_address;
///
/// assert!(is_wildcard_address("acme_*"));
/// assert!(!is_wildcard_address("acme_notes"));
/// ```
pub fn is_wildcard_address(address: &str) -> bool {
    address.contains('*') || address.contains('?') || address.contains(',')
}

/// Percent-encode a single URL path segment (an index name or document id).
pub fn encode_path_segment(segment: &str) -> String {
    byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
