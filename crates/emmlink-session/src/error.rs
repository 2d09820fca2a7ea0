use std::time::Duration;

use emmlink_extract::ExtractedResponse;
use emmlink_frame::{command_name, result_name};

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level failure: dial, stream open, or close.
    #[error("connection error: {0}")]
    Connection(#[from] emmlink_transport::TransportError),

    /// Malformed framing where a well-formed message was required.
    #[error("protocol error: {0}")]
    Protocol(#[from] emmlink_frame::FrameError),

    /// Cipher failure while building or opening a message.
    #[error("crypto error: {0}")]
    Crypto(#[from] emmlink_cipher::CipherError),

    /// No data arrived before the read deadline or idle threshold.
    #[error("timed out after {0:?} without a response")]
    Timeout(Duration),

    /// The response grew past the configured download limit. `partial`
    /// holds what was collected up to that point.
    #[error("response exceeded download limit: {received} bytes (max {max})")]
    Overflow {
        received: u64,
        max: u64,
        partial: Option<Box<ExtractedResponse>>,
    },

    /// The peer closed the stream or connection at the application level.
    #[error("peer closed the connection: {0}")]
    ApplicationClose(std::io::Error),

    /// The stream ended before a usable response was obtained.
    #[error("incomplete response: {0}")]
    IncompleteResponse(String),

    /// The init exchange completed but the peer refused it.
    #[error(
        "handshake rejected: command {} ({command}), result {} ({result})",
        command_name(*command),
        result_name(*result)
    )]
    HandshakeRejected { command: u16, result: u16 },

    /// An encrypted exchange was attempted without an encrypted handshake.
    #[error("encrypted exchange requires an encrypted handshake first")]
    HandshakeRequired,

    /// An operation that needs a connection was called without one.
    #[error("not connected")]
    NotConnected,

    /// Required request fields were missing.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No attempt succeeded. `partial` holds the largest response
    /// accumulated by any attempt, if one produced data.
    #[error("giving up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<SessionError>,
        partial: Option<Box<ExtractedResponse>>,
    },
}

impl SessionError {
    /// Response salvaged from the bytes collected before the failure.
    pub fn partial_response(&self) -> Option<&ExtractedResponse> {
        match self {
            Self::Overflow { partial, .. } | Self::RetriesExhausted { partial, .. } => {
                partial.as_deref()
            }
            _ => None,
        }
    }

    /// Raw bytes collected before the failure, if any.
    pub fn partial(&self) -> &[u8] {
        self.partial_response()
            .map_or(&[], |partial| partial.raw_data.as_slice())
    }

    /// The error that ended the last attempt, looking through retry
    /// exhaustion.
    pub fn root(&self) -> &SessionError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use emmlink_extract::{extract, ExtractOptions};
    use emmlink_frame::{result, INIT_ACK};

    use super::*;

    #[test]
    fn handshake_rejection_names_codes() {
        let err = SessionError::HandshakeRejected {
            command: INIT_ACK,
            result: result::USER_FORBIDDEN,
        };
        let text = err.to_string();
        assert!(text.contains("INIT_ACK"));
        assert!(text.contains("8007"));
    }

    #[test]
    fn exhaustion_exposes_partial_and_root() {
        let partial = extract(b"raw abc".to_vec(), b"abc".to_vec(), &ExtractOptions::default());
        let err = SessionError::RetriesExhausted {
            attempts: 3,
            last: Box::new(SessionError::Timeout(Duration::from_secs(1))),
            partial: Some(Box::new(partial)),
        };
        assert_eq!(err.partial(), b"raw abc");
        assert_eq!(err.partial_response().map(|p| p.content()), Some(&b"abc"[..]));
        assert!(matches!(err.root(), SessionError::Timeout(_)));
        assert!(err.to_string().contains("3 attempt"));
    }

    #[test]
    fn errors_without_data_have_no_partial() {
        let err = SessionError::Overflow {
            received: 70,
            max: 64,
            partial: None,
        };
        assert!(err.partial().is_empty());
        assert!(SessionError::NotConnected.partial_response().is_none());
    }
}
