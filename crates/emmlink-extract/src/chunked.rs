use tracing::debug;

use crate::error::{ExtractError, Result};

/// Decode an HTTP/1.1 chunked body.
///
/// Size lines may end in `\r\n` or a bare `\n`, and `;` extensions are
/// ignored. A chunk that claims more bytes than remain is clamped to what is
/// there (the response was cut short); decoding stops at the zero-size chunk.
/// Trailers after the last chunk are not interpreted.
pub fn decode_chunked(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut remaining = body;
    let mut chunks = 0usize;

    while !remaining.is_empty() {
        let line_end = remaining
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ExtractError::MissingChunkLine)?;
        let line = String::from_utf8_lossy(&remaining[..line_end]);
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = u64::from_str_radix(size_text, 16)
            .map_err(|_| ExtractError::InvalidChunkSize(size_text.to_string()))?;

        if size == 0 {
            break;
        }

        let data = &remaining[line_end + 1..];
        let wanted = usize::try_from(size).unwrap_or(usize::MAX);
        chunks += 1;
        if wanted >= data.len() {
            out.extend_from_slice(data);
            break;
        }
        out.extend_from_slice(&data[..wanted]);

        let after = &data[wanted..];
        remaining = if let Some(rest) = after.strip_prefix(b"\r\n") {
            rest
        } else if let Some(rest) = after.strip_prefix(b"\n") {
            rest
        } else {
            after
        };
    }

    debug!(chunks, decoded = out.len(), "decoded chunked body");
    Ok(out)
}
