//! Recover message boundaries from an accumulated response buffer.
//!
//! The transport gives no guarantee that reads line up with messages, and
//! peers sometimes interleave unframed bytes. Segmentation walks the buffer
//! header by header, resynchronizes on the next "EMM:" tag after garbage, and
//! degrades to copying bytes verbatim instead of failing.

use std::convert::Infallible;
use std::fmt;

use memchr::memmem::find;
use tracing::{debug, warn};

use crate::codec::{ResponseHeader, HEADER_SIZE, MAGIC};
use crate::command::{command_name, is_known_command, LINK_CLOSE};

/// How far past a failed decode to look for the next tag or "HTTP/" marker.
pub const RESYNC_WINDOW: usize = 100;

const HTTP_MARKER: &[u8] = b"HTTP/";

/// Why segmentation stopped before consuming every byte as a framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Unframed bytes from an "HTTP/" marker to the end were taken as-is.
    HttpMarker,
    /// No tag or marker nearby; the remaining bytes were taken as-is.
    Verbatim,
    /// The last header declared more body than was received.
    Truncated,
    /// A LINK_CLOSE message ended the response.
    LinkClosed,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HttpMarker => "http-marker",
            Self::Verbatim => "verbatim",
            Self::Truncated => "truncated",
            Self::LinkClosed => "link-closed",
        };
        f.write_str(name)
    }
}

/// Result of a segmentation pass.
#[derive(Debug, Clone, Default)]
pub struct Segmented {
    /// Concatenated message bodies plus any fallback bytes.
    pub pure: Vec<u8>,
    /// Headers of every message recognized, in order.
    pub frames: Vec<ResponseHeader>,
    /// Number of times the pass skipped garbage to reach a tag.
    pub resyncs: usize,
    pub fallback: Option<Fallback>,
}

/// Segment `raw` without transforming bodies.
pub fn segment(raw: &[u8]) -> Segmented {
    segment_with(raw, |_, body| Ok::<_, Infallible>(body.to_vec()))
}

/// Segment `raw`, passing every body through `open` (e.g. decryption).
///
/// If `open` fails the raw body bytes are kept. Never fails.
pub fn segment_with<F, E>(raw: &[u8], mut open: F) -> Segmented
where
    F: FnMut(&ResponseHeader, &[u8]) -> Result<Vec<u8>, E>,
    E: fmt::Display,
{
    let mut out = Segmented::default();
    let mut offset = 0usize;

    while offset < raw.len() {
        let rest = &raw[offset..];

        let header = match ResponseHeader::decode(rest) {
            Ok(header) => header,
            Err(err) => {
                let window = &rest[..rest.len().min(RESYNC_WINDOW)];
                if let Some(skip) = find_tag_after_start(window) {
                    warn!(offset, skip, error = %err, "resynchronizing on next header tag");
                    out.resyncs += 1;
                    offset += skip;
                    continue;
                }
                if let Some(pos) = find(window, HTTP_MARKER) {
                    debug!(offset = offset + pos, "unframed HTTP content, taking remainder");
                    out.pure.extend_from_slice(&rest[pos..]);
                    out.fallback = Some(Fallback::HttpMarker);
                } else {
                    debug!(offset, len = rest.len(), "no header tag, taking remainder verbatim");
                    out.pure.extend_from_slice(rest);
                    out.fallback = Some(Fallback::Verbatim);
                }
                break;
            }
        };

        out.frames.push(header);
        debug!(
            offset,
            command = command_name(header.command),
            result = header.result,
            data_len = header.data_len,
            "segment"
        );

        if header.command == LINK_CLOSE {
            out.fallback = Some(Fallback::LinkClosed);
            break;
        }

        let total = header.message_len();
        let truncated = rest.len() < total;
        let body = &rest[HEADER_SIZE..total.min(rest.len())];
        if !body.is_empty() {
            match open(&header, body) {
                Ok(opened) => out.pure.extend_from_slice(&opened),
                Err(err) => {
                    warn!(offset, error = %err, "could not open body, keeping raw bytes");
                    out.pure.extend_from_slice(body);
                }
            }
        }

        if truncated {
            debug!(
                offset,
                declared = header.data_len,
                available = body.len(),
                "truncated final message"
            );
            out.fallback = Some(Fallback::Truncated);
            break;
        }
        offset += total;
    }

    out
}

/// Remove inline 20-byte headers left inside already-extracted content.
///
/// An occurrence of the tag is treated as a header only if it decodes, names
/// a known command, and declares a body that fits in the bytes after it.
pub fn strip_stray_headers(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut stripped = 0usize;
    let mut i = 0usize;

    while i < data.len() {
        if data[i..].starts_with(&MAGIC) {
            if let Ok(header) = ResponseHeader::decode(&data[i..]) {
                let remaining = data.len() - i - HEADER_SIZE;
                if is_known_command(header.command) && header.data_len as usize <= remaining {
                    stripped += 1;
                    i += HEADER_SIZE;
                    continue;
                }
            }
        }
        out.push(data[i]);
        i += 1;
    }

    if stripped > 0 {
        debug!(stripped, "removed inline headers from content");
    }
    out
}

/// Offset of the first tag strictly after position 0.
fn find_tag_after_start(window: &[u8]) -> Option<usize> {
    window
        .get(1..)
        .and_then(|tail| find(tail, &MAGIC))
        .map(|pos| pos + 1)
}
