use std::io::{Error, ErrorKind};

use emmlink_frame::{FrameError, MessageWriter, RequestHeader};
use emmlink_transport::{is_application_close, Stream, StreamWriter};

use crate::error::SessionError;

/// Write one complete request message, returning the bytes written.
pub(crate) fn send_request<S: Stream + ?Sized>(
    stream: &mut S,
    header: RequestHeader,
    body: &[u8],
) -> Result<usize, SessionError> {
    let mut writer = MessageWriter::new(StreamWriter::new(stream));
    writer.send_request(header, body).map_err(write_error)
}

fn write_error(err: FrameError) -> SessionError {
    match err {
        FrameError::Io(err) => io_error(err),
        FrameError::ConnectionClosed => {
            SessionError::Io(Error::new(ErrorKind::WriteZero, "stream accepted no bytes"))
        }
        other => SessionError::Protocol(other),
    }
}

/// Classify a stream error, separating application-level closes.
pub(crate) fn io_error(err: Error) -> SessionError {
    if is_application_close(&err) {
        SessionError::ApplicationClose(err)
    } else {
        SessionError::Io(err)
    }
}
