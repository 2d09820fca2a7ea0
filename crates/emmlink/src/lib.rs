//! Client for the EMM framed request/response protocol.
//!
//! EMM carries opaque requests, usually HTTP, over a reliable byte stream
//! inside 20-byte-header messages, optionally AES encrypted. Responses
//! arrive in arbitrarily sized reads with no reliable end marker; this
//! crate reassembles them and recovers any embedded HTTP response.
//!
//! # Crate Structure
//!
//! - [`transport`] - Stream capability interface and a TCP implementation
//! - [`frame`] - Wire header codec and response segmentation
//! - [`cipher`] - Per-request key derivation and AES-CBC body encryption
//! - [`extract`] - Embedded HTTP detection, parsing, and chunked decoding
//! - [`session`] - Handshake, exchange, retry (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use emmlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use emmlink_frame::*;
}

/// Re-export cipher types.
pub mod cipher {
    pub use emmlink_cipher::*;
}

/// Re-export extraction types.
pub mod extract {
    pub use emmlink_extract::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use emmlink_session::*;
}
