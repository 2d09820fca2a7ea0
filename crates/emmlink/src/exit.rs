use std::fmt;
use std::io;

use emmlink_frame::FrameError;
use emmlink_session::SessionError;
use emmlink_transport::TransportError;

// Exit codes follow sysexits(3) for usage and timeout(1) for deadlines.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(&err), format!("{context}: {err}"))
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    CliError::new(session_code(err.root()), format!("{context}: {err}"))
}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    }
}

fn transport_code(err: &TransportError) -> i32 {
    match err {
        TransportError::Connect { source, .. } if source.kind() == io::ErrorKind::TimedOut => {
            TIMEOUT
        }
        TransportError::DeadlineElapsed => TIMEOUT,
        _ => TRANSPORT_ERROR,
    }
}

fn frame_code(err: &FrameError) -> i32 {
    match err {
        FrameError::Io(source) => io_code(source),
        FrameError::ConnectionClosed => TRANSPORT_ERROR,
        FrameError::Truncated { .. }
        | FrameError::InvalidMagic { .. }
        | FrameError::PayloadTooLarge { .. } => DATA_INVALID,
    }
}

fn session_code(err: &SessionError) -> i32 {
    match err {
        SessionError::Connection(err) => transport_code(err),
        SessionError::Protocol(err) => frame_code(err),
        SessionError::Crypto(_) | SessionError::Overflow { .. } => DATA_INVALID,
        SessionError::Timeout(_) => TIMEOUT,
        SessionError::ApplicationClose(_)
        | SessionError::IncompleteResponse(_)
        | SessionError::NotConnected => TRANSPORT_ERROR,
        SessionError::HandshakeRejected { .. } => FAILURE,
        SessionError::InvalidRequest(_) => USAGE,
        SessionError::Io(err) => io_code(err),
        SessionError::HandshakeRequired | SessionError::Json(_) => INTERNAL,
        SessionError::RetriesExhausted { last, .. } => session_code(last),
    }
}
