use std::net::SocketAddr;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The caller-supplied connect deadline passed before a connection was made.
    #[error("connect deadline elapsed")]
    DeadlineElapsed,

    /// Failed to open a new stream on an established connection.
    #[error("failed to open stream: {0}")]
    OpenStream(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A peer-initiated application-level close of a stream or connection.
///
/// QUIC stacks report these as "Application error 0x<code>"; a transport
/// implementation wraps this type inside `std::io::Error` so callers can
/// recognise it with [`is_application_close`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Application error {code:#x}: {reason}")]
pub struct ApplicationClose {
    pub code: u64,
    pub reason: String,
}

impl ApplicationClose {
    pub fn new(code: u64, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Wrap into an `io::Error` for returning from stream operations.
    pub fn into_io(self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionAborted, self)
    }
}

/// Returns true if the error signals an application-level close by the peer.
pub fn is_application_close(err: &std::io::Error) -> bool {
    if err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<ApplicationClose>())
        .is_some()
    {
        return true;
    }
    err.to_string()
        .to_ascii_lowercase()
        .contains("application error 0x")
}

/// Returns true if the error is a read/write deadline expiry.
pub fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_application_close_is_recognised() {
        let err = ApplicationClose::new(0, "peer going away").into_io();
        assert!(is_application_close(&err));
        assert!(!is_timeout(&err));
    }

    #[test]
    fn textual_application_close_is_recognised() {
        let err = std::io::Error::other("Application error 0x0 (remote)");
        assert!(is_application_close(&err));
    }

    #[test]
    fn plain_reset_is_not_application_close() {
        let err = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(!is_application_close(&err));
    }

    #[test]
    fn timeout_kinds() {
        assert!(is_timeout(&std::io::Error::from(std::io::ErrorKind::TimedOut)));
        assert!(is_timeout(&std::io::Error::from(
            std::io::ErrorKind::WouldBlock
        )));
        assert!(!is_timeout(&std::io::Error::from(
            std::io::ErrorKind::BrokenPipe
        )));
    }
}
