/// Errors that can occur during header encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a full header were supplied.
    #[error("truncated header ({len} bytes, need 20)")]
    Truncated { len: usize },

    /// The header tag is not the "EMM:" magic.
    #[error("invalid header magic {found:#010x} (expected 0x454d4d3a \"EMM:\")")]
    InvalidMagic { found: u32 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted zero bytes mid-message.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
