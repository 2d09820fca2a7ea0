use std::io::{ErrorKind, Write};
use std::time::Instant;

use crate::error::Result;

/// Outcome of a single low-level read.
///
/// An empty read is not end-of-stream: QUIC stacks can wake a reader with no
/// data. Callers decide when repeated empty reads mean the peer is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n > 0` bytes were placed at the start of the buffer.
    Data(usize),
    /// The read returned without data and without an error.
    Empty,
    /// The peer finished its side of the stream.
    Eof,
}

/// A bidirectional byte stream: reliable, ordered, no message boundaries.
///
/// Deadline expiry is reported as an `io::Error` of kind `TimedOut` or
/// `WouldBlock`.
pub trait Stream: Send {
    /// Perform one read into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<ReadOutcome>;

    /// Write some prefix of `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Flush buffered writes.
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Arm (or with `None`, clear) the deadline for subsequent reads.
    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<()>;

    /// Close the stream. Further reads and writes fail.
    fn close(&mut self) -> Result<()>;
}

/// An established transport connection that can open streams.
pub trait Connection: Send {
    type Stream: Stream;

    /// Open a new bidirectional stream.
    fn open_stream(&mut self) -> Result<Self::Stream>;

    /// Close the connection and every stream opened on it.
    fn close(&mut self) -> Result<()>;
}

/// Produces connections to one fixed peer.
///
/// The TLS/QUIC handshake, version negotiation, and local path selection all
/// live behind this trait.
pub trait Connector: Send + Sync {
    type Connection: Connection;

    /// Establish a connection, giving up once `deadline` passes.
    fn connect(&self, deadline: Option<Instant>) -> Result<Self::Connection>;
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<ReadOutcome> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (**self).flush()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        (**self).set_read_deadline(deadline)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Borrowing adapter exposing a [`Stream`]'s write half as `std::io::Write`.
pub struct StreamWriter<'a, S: ?Sized> {
    inner: &'a mut S,
}

impl<'a, S: Stream + ?Sized> StreamWriter<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self { inner }
    }
}

impl<S: Stream + ?Sized> Write for StreamWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.flush() {
            Err(err) if err.kind() == ErrorKind::Unsupported => Ok(()),
            other => other,
        }
    }
}
