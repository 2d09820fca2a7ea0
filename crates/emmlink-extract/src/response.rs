use emmlink_cipher::md5_hex;
use emmlink_frame::strip_stray_headers;
use memchr::memmem::find;
use tracing::{debug, warn};

use crate::detect::is_http_response;
use crate::http::{parse_http_response, HttpResponse};

/// Options for turning a reassembled payload into a response.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Use the HTTP body (rather than the whole payload) as content when the
    /// payload is recognized as HTTP. Default: true.
    pub detect_http: bool,
    /// Strip inline 20-byte headers from the payload before interpretation.
    /// Default: false.
    pub repair_inline_headers: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            detect_http: true,
            repair_inline_headers: false,
        }
    }
}

/// Which bytes [`ExtractedResponse::content`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    HttpBody,
    PurePayload,
}

/// Final product of an exchange.
#[derive(Debug, Clone)]
pub struct ExtractedResponse {
    /// Every byte read from the stream, framing included.
    pub raw_data: Vec<u8>,
    /// Message bodies with framing removed.
    pub pure_data: Vec<u8>,
    /// Parsed HTTP message, if the payload looked like one and parsed.
    pub http: Option<HttpResponse>,
    /// Lowercase hex MD5 of [`content`](Self::content).
    pub md5: String,
    pub content_source: ContentSource,
}

impl ExtractedResponse {
    /// The bytes a caller should persist or report.
    pub fn content(&self) -> &[u8] {
        match (self.content_source, &self.http) {
            (ContentSource::HttpBody, Some(http)) => &http.body,
            _ => &self.pure_data,
        }
    }

    /// HTTP status code, if an HTTP response was recognized.
    pub fn status_code(&self) -> Option<u16> {
        self.http.as_ref().map(|http| http.status_code)
    }

    /// Content as text, replacing invalid UTF-8.
    pub fn content_lossy(&self) -> String {
        String::from_utf8_lossy(self.content()).into_owned()
    }
}

/// Interpret a pure payload, attaching the raw bytes it came from.
///
/// HTTP detection runs regardless of `detect_http`; the option only selects
/// what [`ExtractedResponse::content`] returns. Never fails: unparseable
/// payloads are reported as-is.
pub fn extract(raw_data: Vec<u8>, pure_data: Vec<u8>, options: &ExtractOptions) -> ExtractedResponse {
    let pure_data = if options.repair_inline_headers {
        strip_stray_headers(&pure_data)
    } else {
        pure_data
    };

    let http = if !pure_data.is_empty() && is_http_response(&pure_data) {
        match parse_http_response(&pure_data) {
            Ok(mut http) => {
                recover_empty_body(&mut http, &pure_data);
                debug!(
                    status = http.status_code,
                    body_len = http.body.len(),
                    "parsed HTTP response"
                );
                Some(http)
            }
            Err(err) => {
                warn!(error = %err, "payload looked like HTTP but did not parse");
                None
            }
        }
    } else {
        None
    };

    let content_source = if options.detect_http && http.is_some() {
        ContentSource::HttpBody
    } else {
        ContentSource::PurePayload
    };

    let mut response = ExtractedResponse {
        raw_data,
        pure_data,
        http,
        md5: String::new(),
        content_source,
    };
    response.md5 = md5_hex(response.content());
    debug!(
        raw = response.raw_data.len(),
        pure = response.pure_data.len(),
        content = response.content().len(),
        md5 = %response.md5,
        "extracted response"
    );
    response
}

/// Approximate recovery when a response with a positive `Content-Length`
/// parsed to an empty body: first re-slice after the separator in the
/// payload, then for a 200 fall back to the whole payload.
fn recover_empty_body(http: &mut HttpResponse, pure: &[u8]) {
    let Some(expected) = http.content_length().filter(|len| *len > 0) else {
        return;
    };

    if http.body.is_empty() {
        if let Some(split) = find(pure, b"\r\n\r\n") {
            let direct = &pure[split + 4..];
            if !direct.is_empty() {
                debug!(len = direct.len(), "re-sliced empty HTTP body from payload");
                http.body = direct.to_vec();
            }
        }
    }

    if http.body.is_empty() && http.status_code == 200 && pure.len() as i64 >= expected {
        warn!(
            expected,
            payload = pure.len(),
            "empty HTTP body, using entire payload"
        );
        http.body = pure.to_vec();
    }
}
