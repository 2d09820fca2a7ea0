//! EMM wire codec.
//!
//! Every message starts with a fixed 20-byte big-endian header:
//! - a 4-byte tag, ASCII "EMM:", for stream synchronization
//! - version and command words
//! - protocol type / result and option fields
//! - a 4-byte body length and a trailing CRC (requests) or origin length
//!   (responses)
//!
//! The [`segment`] module turns an accumulated response buffer back into
//! message bodies, tolerating misaligned and unframed bytes.

pub mod codec;
pub mod command;
pub mod error;
pub mod segment;
pub mod writer;

pub use codec::{
    decode_response, encode_request, encode_response, RequestHeader, ResponseFrame,
    ResponseHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC, MAGIC_TAG, PROTO_VERSION,
};
pub use command::{
    command_name, is_known_command, proto_type, proto_type_name, result, result_name, AUTH,
    AUTH_ACK, DATA_PROTO_BINARY, DATA_PROTO_JSON, HEART_BEAT, INIT, INIT_ACK, LINK_CLOSE,
    LINK_CLOSE_ACK, LINK_HEART_BEAT, LINK_HEART_BEAT_ACK, TRAN, TRAN_ACK,
};
pub use error::{FrameError, Result};
pub use segment::{segment, segment_with, strip_stray_headers, Fallback, Segmented, RESYNC_WINDOW};
pub use writer::MessageWriter;
