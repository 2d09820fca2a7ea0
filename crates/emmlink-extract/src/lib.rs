//! Interpretation of reassembled response payloads.
//!
//! Upstream services usually answer with an HTTP/1.x message, but it may be
//! preceded by noise, split oddly, or chunk-encoded. Detection is heuristic;
//! parsing is lenient and never discards the payload it was given.

pub mod chunked;
pub mod detect;
pub mod error;
pub mod http;
pub mod response;

pub use chunked::decode_chunked;
pub use detect::is_http_response;
pub use error::{ExtractError, Result};
pub use http::{parse_http_response, HttpResponse};
pub use response::{extract, ContentSource, ExtractOptions, ExtractedResponse};
