//! Scripted transport fakes for unit tests.

use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use emmlink_frame::{encode_response, ResponseHeader};
use emmlink_transport::{
    ApplicationClose, Connection, Connector, ReadOutcome, Stream, TransportError,
};

use crate::retry::ManualClock;

/// Encode one response message.
pub(crate) fn reply(header: ResponseHeader, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_response(header, body, &mut buf).expect("test body fits");
    buf.to_vec()
}

enum Step {
    Data(Vec<u8>),
    Empty,
    Eof,
    Timeout,
    Fail(ErrorKind),
    AppClose,
}

/// A stream that replays a fixed sequence of read results.
///
/// Each step can first advance a shared [`ManualClock`]. Once the script
/// runs out every read reports end-of-stream.
pub(crate) struct ScriptedStream {
    steps: VecDeque<(Duration, Step)>,
    clock: Option<ManualClock>,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    write_error: Option<ErrorKind>,
}

impl ScriptedStream {
    pub(crate) fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            clock: None,
            written: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            write_error: None,
        }
    }

    pub(crate) fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    fn push(mut self, after: Duration, step: Step) -> Self {
        self.steps.push_back((after, step));
        self
    }

    pub(crate) fn data(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.push(Duration::ZERO, Step::Data(bytes.into()))
    }

    pub(crate) fn data_after(self, after: Duration, bytes: impl Into<Vec<u8>>) -> Self {
        self.push(after, Step::Data(bytes.into()))
    }

    pub(crate) fn empty_after(self, after: Duration) -> Self {
        self.push(after, Step::Empty)
    }

    pub(crate) fn timeout_after(self, after: Duration) -> Self {
        self.push(after, Step::Timeout)
    }

    pub(crate) fn eof(self) -> Self {
        self.push(Duration::ZERO, Step::Eof)
    }

    pub(crate) fn fail(self, kind: ErrorKind) -> Self {
        self.push(Duration::ZERO, Step::Fail(kind))
    }

    pub(crate) fn app_close(self) -> Self {
        self.push(Duration::ZERO, Step::AppClose)
    }

    pub(crate) fn fail_writes(mut self, kind: ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().expect("written lock").clone()
    }

    pub(crate) fn written_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    pub(crate) fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Stream for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<ReadOutcome> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::from(ErrorKind::NotConnected));
        }
        let Some((after, step)) = self.steps.pop_front() else {
            return Ok(ReadOutcome::Eof);
        };
        if let Some(clock) = &self.clock {
            clock.advance(after);
        }
        match step {
            Step::Data(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps
                        .push_front((Duration::ZERO, Step::Data(bytes[n..].to_vec())));
                }
                Ok(ReadOutcome::Data(n))
            }
            Step::Empty => Ok(ReadOutcome::Empty),
            Step::Eof => Ok(ReadOutcome::Eof),
            Step::Timeout => Err(Error::from(ErrorKind::TimedOut)),
            Step::Fail(kind) => Err(Error::from(kind)),
            Step::AppClose => Err(ApplicationClose::new(0, "stream reset").into_io()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(Error::from(kind));
        }
        self.written.lock().expect("written lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn set_read_deadline(&mut self, _deadline: Option<Instant>) -> emmlink_transport::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> emmlink_transport::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A connection handing out pre-built streams in order.
pub(crate) struct ScriptedConnection {
    streams: VecDeque<ScriptedStream>,
}

impl ScriptedConnection {
    pub(crate) fn new(streams: impl IntoIterator<Item = ScriptedStream>) -> Self {
        Self {
            streams: streams.into_iter().collect(),
        }
    }
}

impl Connection for ScriptedConnection {
    type Stream = ScriptedStream;

    fn open_stream(&mut self) -> emmlink_transport::Result<ScriptedStream> {
        self.streams
            .pop_front()
            .ok_or_else(|| TransportError::OpenStream(Error::from(ErrorKind::ConnectionRefused)))
    }

    fn close(&mut self) -> emmlink_transport::Result<()> {
        self.streams.clear();
        Ok(())
    }
}

/// A connector handing out pre-built connections; `None` entries fail.
pub(crate) struct ScriptedConnector {
    connections: Mutex<VecDeque<Option<ScriptedConnection>>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    pub(crate) fn new(connections: impl IntoIterator<Item = Option<ScriptedConnection>>) -> Self {
        Self {
            connections: Mutex::new(connections.into_iter().collect()),
            connects: AtomicUsize::new(0),
        }
    }

    /// A connector with a single connection serving `streams`.
    pub(crate) fn single(streams: impl IntoIterator<Item = ScriptedStream>) -> Self {
        Self::new([Some(ScriptedConnection::new(streams))])
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    fn connect(&self, _deadline: Option<Instant>) -> emmlink_transport::Result<ScriptedConnection> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self
            .connections
            .lock()
            .expect("connections lock")
            .pop_front()
            .flatten();
        next.ok_or_else(|| TransportError::Connect {
            addr: ([127, 0, 0, 1], 9).into(),
            source: Error::from(ErrorKind::ConnectionRefused),
        })
    }
}
