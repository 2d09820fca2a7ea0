use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_request, RequestHeader, DEFAULT_MAX_PAYLOAD};
use crate::command::command_name;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete EMM messages to any `Write` stream.
///
/// Each send encodes header and body into one buffer and writes it in full,
/// so a message is never interleaved with a partial previous one.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    max_payload_size: usize,
}

impl<T: Write> MessageWriter<T> {
    /// Create a writer with the default body size limit.
    pub fn new(inner: T) -> Self {
        Self::with_max_payload(inner, DEFAULT_MAX_PAYLOAD)
    }

    /// Create a writer that rejects bodies larger than `max_payload_size`.
    pub fn with_max_payload(inner: T, max_payload_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload_size,
        }
    }

    /// Encode and send a request. Returns the number of bytes written.
    pub fn send_request(&mut self, header: RequestHeader, body: &[u8]) -> Result<usize> {
        self.check_size(body)?;
        self.buf.clear();
        encode_request(header, body, &mut self.buf)?;
        trace!(
            command = command_name(header.command),
            body_len = body.len(),
            "sending request"
        );
        self.write_buffered()
    }

    fn check_size(&self, body: &[u8]) -> Result<()> {
        if body.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: body.len(),
                max: self.max_payload_size,
            });
        }
        Ok(())
    }

    fn write_buffered(&mut self) -> Result<usize> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        Ok(offset)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}
