//! Stream transport capability interface.
//!
//! The protocol core never dials, negotiates, or selects paths itself. It
//! consumes a minimal capability set supplied by the transport collaborator:
//! - open a bidirectional stream on a connection
//! - read, write, and flush bytes on that stream
//! - arm a read deadline
//! - close the stream and the connection
//!
//! A QUIC connection satisfies this interface directly. [`TcpConnector`]
//! provides a plain TCP substitute used by tests and the command-line tool.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{
    is_application_close, is_timeout, ApplicationClose, Result, TransportError,
};
pub use tcp::{TcpConnection, TcpConnector, TcpStreamAdapter};
pub use traits::{Connection, Connector, ReadOutcome, Stream, StreamWriter};
