use std::collections::BTreeMap;
use std::sync::LazyLock;

use memchr::memmem::find;
use regex::Regex;
use tracing::{debug, warn};

use crate::chunked::decode_chunked;
use crate::error::{ExtractError, Result};

static STATUS_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"HTTP/\d\.\d\s+(\d{3})\s+").ok());

/// An HTTP response recovered from a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code from the status line, or 0 if it could not be read.
    pub status_code: u16,
    /// Header fields as sent. Names are unique ignoring ASCII case.
    pub headers: BTreeMap<String, String>,
    /// Body bytes, chunk-decoded if the response was chunked.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Look up a header ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// `Content-Length` as a number, if present and numeric.
    pub fn content_length(&self) -> Option<i64> {
        self.header("Content-Length")
            .and_then(|value| value.parse().ok())
    }

    /// True if `Transfer-Encoding` is `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.header("Transfer-Encoding")
            .is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
    }

    fn insert_header(&mut self, key: &str, value: &str) {
        self.headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(key));
        self.headers.insert(key.to_string(), value.to_string());
    }
}

/// Parse an HTTP response out of `data`.
///
/// Bytes before the first "HTTP/" marker are dropped. Headers end at the
/// first `\r\n\r\n`, or failing that the first `\n\n`. A chunked body is
/// decoded; if decoding fails or yields nothing while `Content-Length` is
/// positive, the undecoded body is kept.
pub fn parse_http_response(data: &[u8]) -> Result<HttpResponse> {
    if data.is_empty() {
        return Err(ExtractError::Empty);
    }

    let data = match find(data, b"HTTP/") {
        Some(start) if start > 0 => {
            debug!(start, "skipping bytes before status line");
            &data[start..]
        }
        _ => data,
    };

    let (head, raw_body) = if let Some(split) = find(data, b"\r\n\r\n") {
        (&data[..split], &data[split + 4..])
    } else if let Some(split) = find(data, b"\n\n") {
        (&data[..split], &data[split + 2..])
    } else {
        return Err(ExtractError::MissingSeparator);
    };

    let head = String::from_utf8_lossy(head);
    let mut lines = head.lines();
    let mut response = HttpResponse::default();

    let status_line = lines.next().unwrap_or_default();
    response.status_code = STATUS_CODE
        .as_ref()
        .and_then(|re| re.captures(status_line))
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse().ok())
        .unwrap_or_default();
    if response.status_code == 0 {
        debug!(status_line, "no status code in status line");
    }

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => response.insert_header(key.trim(), value.trim()),
            None => debug!(line, "skipping malformed header line"),
        }
    }

    let mut body = raw_body.to_vec();
    if response.is_chunked() {
        match decode_chunked(raw_body) {
            Ok(decoded) => body = decoded,
            Err(err) => warn!(error = %err, "chunked decode failed, keeping encoded body"),
        }
    }

    let content_length = response.content_length();
    if body.is_empty() && content_length.is_some_and(|len| len > 0) {
        body = raw_body.to_vec();
    }
    if let Some(expected) = content_length {
        if expected >= 0 && body.len() as i64 != expected {
            debug!(expected, actual = body.len(), "body length differs from Content-Length");
        }
    }

    response.body = body;
    Ok(response)
}
