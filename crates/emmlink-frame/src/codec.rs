use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Header size shared by requests and responses.
pub const HEADER_SIZE: usize = 20;

/// Header tag: ASCII "EMM:" read as a big-endian u32.
pub const MAGIC_TAG: u32 = 1_162_693_946;

/// Header tag bytes as they appear on the wire.
pub const MAGIC: [u8; 4] = *b"EMM:";

/// Protocol version written into every request.
pub const PROTO_VERSION: u16 = 1;

/// Default maximum request body size: 64 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Client-to-server header.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌──────────┬─────────┬─────────┬───────┬────────┬─────────┬─────────┬────────┐
/// │ Tag (4B) │ Version │ Command │ Proto │ Option │ Reserve │ DataLen │ Crc    │
/// │ "EMM:"   │ (2B)    │ (2B)    │ (1B)  │ (1B)   │ (2B)    │ (4B)    │ (4B)   │
/// └──────────┴─────────┴─────────┴───────┴────────┴─────────┴─────────┴────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub version: u16,
    pub command: u16,
    pub proto_type: u8,
    pub option: u8,
    pub reserve: u16,
    pub data_len: u32,
    /// Carried as-is; nothing in the protocol validates it.
    pub crc: u32,
}

impl RequestHeader {
    /// A version-1 header for `command` with all optional fields zeroed.
    pub fn new(command: u16, proto_type: u8) -> Self {
        Self {
            version: PROTO_VERSION,
            command,
            proto_type,
            option: 0,
            reserve: 0,
            data_len: 0,
            crc: 0,
        }
    }

    /// Append the 20 header bytes to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32(MAGIC_TAG);
        dst.put_u16(self.version);
        dst.put_u16(self.command);
        dst.put_u8(self.proto_type);
        dst.put_u8(self.option);
        dst.put_u16(self.reserve);
        dst.put_u32(self.data_len);
        dst.put_u32(self.crc);
    }

    /// The 20 header bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut dst = &mut out[..];
        dst.put_u32(MAGIC_TAG);
        dst.put_u16(self.version);
        dst.put_u16(self.command);
        dst.put_u8(self.proto_type);
        dst.put_u8(self.option);
        dst.put_u16(self.reserve);
        dst.put_u32(self.data_len);
        dst.put_u32(self.crc);
        out
    }

    /// Decode the first 20 bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = checked_header(src)?;
        Ok(Self {
            version: buf.get_u16(),
            command: buf.get_u16(),
            proto_type: buf.get_u8(),
            option: buf.get_u8(),
            reserve: buf.get_u16(),
            data_len: buf.get_u32(),
            crc: buf.get_u32(),
        })
    }
}

/// Server-to-client header. Same layout as [`RequestHeader`] except that
/// bytes 8-9 hold `Result` and the trailing word is `OriginLen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u16,
    pub command: u16,
    pub result: u16,
    pub option: u8,
    pub reserve: u8,
    pub data_len: u32,
    pub origin_len: u32,
}

impl ResponseHeader {
    pub fn new(command: u16, result: u16) -> Self {
        Self {
            version: PROTO_VERSION,
            command,
            result,
            option: 0,
            reserve: 0,
            data_len: 0,
            origin_len: 0,
        }
    }

    /// Append the 20 header bytes to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32(MAGIC_TAG);
        dst.put_u16(self.version);
        dst.put_u16(self.command);
        dst.put_u16(self.result);
        dst.put_u8(self.option);
        dst.put_u8(self.reserve);
        dst.put_u32(self.data_len);
        dst.put_u32(self.origin_len);
    }

    /// Decode the first 20 bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let mut buf = checked_header(src)?;
        Ok(Self {
            version: buf.get_u16(),
            command: buf.get_u16(),
            result: buf.get_u16(),
            option: buf.get_u8(),
            reserve: buf.get_u8(),
            data_len: buf.get_u32(),
            origin_len: buf.get_u32(),
        })
    }

    /// Header plus declared body length.
    pub fn message_len(&self) -> usize {
        HEADER_SIZE + self.data_len as usize
    }
}

/// Validate length and tag; returns the 16 header bytes after the tag.
fn checked_header(src: &[u8]) -> Result<&[u8]> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated { len: src.len() });
    }
    let mut buf = &src[..HEADER_SIZE];
    let tag = buf.get_u32();
    if tag != MAGIC_TAG {
        return Err(FrameError::InvalidMagic { found: tag });
    }
    Ok(buf)
}

/// A complete response message: header plus exactly `DataLen` body bytes.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    pub body: Bytes,
}

impl ResponseFrame {
    /// The total wire size of this message (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode a request: `header` with `DataLen` set from `body`, then the body.
pub fn encode_request(header: RequestHeader, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let data_len = body_len(body)?;
    dst.reserve(HEADER_SIZE + body.len());
    RequestHeader { data_len, ..header }.encode(dst);
    dst.put_slice(body);
    Ok(())
}

/// Encode a response: `header` with `DataLen` set from `body`, then the body.
pub fn encode_response(header: ResponseHeader, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    let data_len = body_len(body)?;
    dst.reserve(HEADER_SIZE + body.len());
    ResponseHeader { data_len, ..header }.encode(dst);
    dst.put_slice(body);
    Ok(())
}

fn body_len(body: &[u8]) -> Result<u32> {
    u32::try_from(body.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: body.len(),
        max: u32::MAX as usize,
    })
}

/// Decode one response message from the front of `src`.
///
/// Returns `Err` if the header is short or carries the wrong tag, and
/// `Ok(None)` if the header is valid but the body has not fully arrived.
pub fn decode_response(src: &[u8]) -> Result<Option<ResponseFrame>> {
    let header = ResponseHeader::decode(src)?;
    let total = header.message_len();
    if src.len() < total {
        return Ok(None);
    }
    Ok(Some(ResponseFrame {
        header,
        body: Bytes::copy_from_slice(&src[HEADER_SIZE..total]),
    }))
}
