use std::sync::LazyLock;

use memchr::memmem::find;
use regex::bytes::Regex;
use tracing::trace;

/// Payloads shorter than this are never treated as HTTP.
pub const MIN_HTTP_LEN: usize = 10;

/// How far into the payload a noise-prefixed "HTTP/" marker may start.
pub const MARKER_WINDOW: usize = 100;

const COMMON_HEADERS: [&str; 8] = [
    "Content-Type:",
    "Content-Length:",
    "Server:",
    "Date:",
    "Last-Modified:",
    "ETag:",
    "Cache-Control:",
    "Access-Control-Allow-Origin:",
];

static STATUS_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)HTTP/\d\.\d\s+\d{3}\s+").ok());

/// Heuristically decide whether `data` holds an HTTP response.
pub fn is_http_response(data: &[u8]) -> bool {
    if data.len() < MIN_HTTP_LEN {
        return false;
    }
    if data.starts_with(b"HTTP/") {
        return true;
    }

    if let Some(pos) = find(data, b"HTTP/") {
        if pos < MARKER_WINDOW {
            let prefix = data[..pos].trim_ascii();
            if prefix.is_empty() || prefix.contains(&b'\n') {
                trace!(pos, "HTTP marker after noise prefix");
                return true;
            }
        }
    }

    let header_count = COMMON_HEADERS
        .iter()
        .filter(|name| find(data, name.as_bytes()).is_some())
        .count();
    if header_count < 2 {
        return false;
    }

    STATUS_LINE.as_ref().is_some_and(|re| re.is_match(data))
        || find(data, b"\r\n\r\n").is_some()
        || find(data, b"\n\n").is_some()
        || header_count >= 3
}
