//! Session client for the EMM protocol.
//!
//! A [`SessionClient`] owns one connection and one stream at a time. It runs
//! the init handshake, sends requests, and collects responses whose length is
//! not known in advance, retrying transient failures per a [`RetryPolicy`].
//! [`request`] wraps the whole sequence in a single call.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod reassembly;
pub mod request;
pub mod retry;
mod wire;

#[cfg(test)]
mod testing;

pub use client::{ExchangeResult, SessionClient, SessionState, TransferStats};
pub use config::{ExchangeOptions, Session};
pub use error::{Result, SessionError};
pub use handshake::{
    encode_init_body, new_request_id, perform_handshake, Handshake, HandshakeMode, InitInfo,
    InitRequest,
};
pub use reassembly::{
    segment_response, Collected, Completion, ReassemblyEngine, StreamAccumulator,
    IDLE_EMPTY_READS, READ_BUFFER_SIZE,
};
pub use request::{request, request_with_clock, unescape_crlf, RequestOutcome};
pub use retry::{Clock, ManualClock, RetryPolicy, SystemClock};
