//! Utility functions for minipd

/// Hex form of a key for logs and error messages
pub fn format_key(key: &[u8]) -> String {
    if key.is_empty() {
        "\"\"".to_string()
    } else {
        hex::encode(key)
    }
}

/// Half-open range `[start, end)` with unbounded ends spelled out
pub fn format_range(start: &[u8], end: &[u8]) -> String {
    let start = if start.is_empty() {
        "-inf".to_string()
    } else {
        hex::encode(start)
    };
    let end = if end.is_empty() {
        "+inf".to_string()
    } else {
        hex::encode(end)
    };
    format!("[{}, {})", start, end)
}

/// Parse a hex key from a URL path segment; `-` is the empty key
pub fn parse_key(s: &str) -> crate::Result<Vec<u8>> {
    if s == "-" {
        return Ok(Vec::new());
    }
    hex::decode(s).map_err(|e| crate::Error::InvalidRequest(format!("invalid hex key {}: {}", s, e)))
}
