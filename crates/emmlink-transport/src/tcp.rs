use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Connection, Connector, ReadOutcome, Stream};

/// Smallest read timeout handed to the socket; a zero timeout is rejected by std.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Dials plain TCP connections to a fixed peer.
///
/// Each opened stream is its own TCP socket, so a "connection" is only the
/// peer address plus the set of sockets opened against it. This is the
/// in-repo stand-in for a QUIC connection.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Default per-dial timeout when the caller supplies no deadline.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the per-dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The peer address this connector dials.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;

    fn connect(&self, deadline: Option<Instant>) -> Result<TcpConnection> {
        let stream = dial(self.addr, self.connect_timeout, deadline)?;
        info!(addr = %self.addr, "connected");
        Ok(TcpConnection {
            addr: self.addr,
            connect_timeout: self.connect_timeout,
            primed: Some(stream),
            opened: Vec::new(),
            closed: false,
        })
    }
}

/// A TCP "connection": the first socket is dialed eagerly, later streams lazily.
#[derive(Debug)]
pub struct TcpConnection {
    addr: SocketAddr,
    connect_timeout: Duration,
    primed: Option<TcpStream>,
    opened: Vec<TcpStream>,
    closed: bool,
}

impl Connection for TcpConnection {
    type Stream = TcpStreamAdapter;

    fn open_stream(&mut self) -> Result<TcpStreamAdapter> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let stream = match self.primed.take() {
            Some(stream) => stream,
            None => dial(self.addr, self.connect_timeout, None)?,
        };
        let handle = stream.try_clone().map_err(TransportError::OpenStream)?;
        self.opened.push(handle);
        debug!(addr = %self.addr, streams = self.opened.len(), "opened stream");
        Ok(TcpStreamAdapter::new(stream))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.primed = None;
        for stream in self.opened.drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        debug!(addr = %self.addr, "connection closed");
        Ok(())
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        let _ = Connection::close(self);
    }
}

/// [`Stream`] over a single TCP socket.
#[derive(Debug)]
pub struct TcpStreamAdapter {
    inner: TcpStream,
    closed: bool,
}

impl TcpStreamAdapter {
    pub fn new(inner: TcpStream) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

impl Stream for TcpStreamAdapter {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<ReadOutcome> {
        if self.closed {
            return Err(std::io::Error::from(std::io::ErrorKind::NotConnected));
        }
        match self.inner.read(buf)? {
            0 => Ok(ReadOutcome::Eof),
            n => Ok(ReadOutcome::Data(n)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::from(std::io::ErrorKind::NotConnected));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        let timeout = deadline.map(|deadline| {
            deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_READ_TIMEOUT)
        });
        self.inner.set_read_timeout(timeout)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn dial(addr: SocketAddr, timeout: Duration, deadline: Option<Instant>) -> Result<TcpStream> {
    let timeout = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::DeadlineElapsed);
            }
            remaining.min(timeout)
        }
        None => timeout,
    };

    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|source| TransportError::Connect { addr, source })?;
    stream
        .set_nodelay(true)
        .map_err(|source| TransportError::Connect { addr, source })?;
    Ok(stream)
}
