//! Response collection when the total length is not known up front.
//!
//! The read loop decides when a response is done: an explicit LINK_CLOSE,
//! end of stream, or silence past the idle threshold. The accumulated bytes
//! are then split back into message bodies by the segmentation pass, which
//! is the authoritative view of the response.

use std::io;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use emmlink_cipher::{decrypt, RequestKey};
use emmlink_frame::{
    command_name, segment, segment_with, ResponseHeader, Segmented, HEADER_SIZE, LINK_CLOSE,
};
use emmlink_transport::{is_timeout, ReadOutcome, Stream};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::ExchangeOptions;
use crate::retry::Clock;

/// Size of the buffer handed to each read.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Consecutive empty reads required before silence can end a response.
pub const IDLE_EMPTY_READS: u32 = 3;

/// Why the read loop decided the response was complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completion {
    /// A chunk carried a LINK_CLOSE header.
    LinkClosed,
    /// A chunk held one complete message and continuation was not required.
    SelfContained,
    /// The peer finished the stream.
    Eof,
    /// Repeated empty reads after the idle threshold.
    Idle,
    /// A read deadline expired after the idle threshold.
    IdleTimeout,
}

/// Raw bytes and read bookkeeping for one exchange attempt.
#[derive(Debug)]
pub struct StreamAccumulator {
    raw: BytesMut,
    reads: u64,
    last_data_at: Instant,
    empty_reads: u32,
    completion: Option<Completion>,
}

impl StreamAccumulator {
    pub fn new(now: Instant) -> Self {
        Self {
            raw: BytesMut::new(),
            reads: 0,
            last_data_at: now,
            empty_reads: 0,
            completion: None,
        }
    }

    /// Append a non-empty chunk read at `now`.
    pub fn push(&mut self, chunk: &[u8], now: Instant) {
        self.raw.extend_from_slice(chunk);
        self.reads += 1;
        self.last_data_at = now;
        self.empty_reads = 0;
    }

    /// Count an empty read, returning the consecutive total.
    pub fn record_empty(&mut self) -> u32 {
        self.empty_reads += 1;
        self.empty_reads
    }

    /// Time since the last chunk, or since creation if none arrived.
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_data_at)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Number of non-empty reads.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    fn finish(&mut self, completion: Completion) {
        self.completion = Some(completion);
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw.to_vec()
    }
}

/// How a read loop ended.
#[derive(Debug)]
pub enum Collected {
    /// The response is complete.
    Complete(StreamAccumulator),
    /// A read failed; the accumulator holds what arrived before it.
    Interrupted {
        acc: StreamAccumulator,
        error: io::Error,
    },
    /// The accumulated bytes passed `max_download_size`. The accumulator
    /// keeps everything read, including the chunk that crossed the limit.
    Overflowed(StreamAccumulator),
}

/// Runs the read loop for one exchange attempt.
pub struct ReassemblyEngine<'a, K: ?Sized> {
    options: &'a ExchangeOptions,
    clock: &'a K,
}

impl<'a, K: Clock + ?Sized> ReassemblyEngine<'a, K> {
    pub fn new(options: &'a ExchangeOptions, clock: &'a K) -> Self {
        Self { options, clock }
    }

    /// Read from `stream` until the response is complete, a read fails, or
    /// the download limit is passed.
    ///
    /// Read errors other than deadline expiry are handed back as
    /// [`Collected::Interrupted`] so the caller can apply its retry policy.
    /// Every outcome carries the bytes read so far.
    pub fn collect<S: Stream + ?Sized>(&self, stream: &mut S) -> Collected {
        let options = self.options;
        let mut acc = StreamAccumulator::new(self.clock.now());
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut timeout = options.read_timeout;

        loop {
            if let Err(err) = stream.set_read_deadline(Some(self.clock.now() + timeout)) {
                debug!(error = %err, "could not arm read deadline");
            }

            match stream.read(&mut buf) {
                Ok(ReadOutcome::Data(n)) => {
                    let chunk = &buf[..n];
                    acc.push(chunk, self.clock.now());
                    trace!(n, total = acc.len(), reads = acc.reads(), "read chunk");

                    if acc.len() as u64 > options.max_download_size {
                        debug!(
                            total = acc.len(),
                            max = options.max_download_size,
                            "download limit exceeded"
                        );
                        return Collected::Overflowed(acc);
                    }
                    if let Some(completion) = self.inspect_chunk(chunk) {
                        acc.finish(completion);
                        break;
                    }
                }
                Ok(ReadOutcome::Empty) => {
                    let empties = acc.record_empty();
                    let silence = acc.silence(self.clock.now());
                    if empties >= IDLE_EMPTY_READS && silence > options.idle_threshold {
                        debug!(empties, ?silence, "idle after empty reads");
                        acc.finish(Completion::Idle);
                        break;
                    }
                }
                Ok(ReadOutcome::Eof) => {
                    acc.finish(Completion::Eof);
                    break;
                }
                Err(err) if is_timeout(&err) => {
                    let silence = acc.silence(self.clock.now());
                    if silence > options.idle_threshold {
                        debug!(?silence, total = acc.len(), "idle after read deadline");
                        acc.finish(Completion::IdleTimeout);
                        break;
                    }
                    trace!(?silence, "read deadline passed, polling again");
                }
                Err(error) => {
                    debug!(%error, total = acc.len(), "read failed");
                    return Collected::Interrupted { acc, error };
                }
            }

            timeout = options.streaming_read_timeout;
        }

        debug!(
            completion = ?acc.completion(),
            total = acc.len(),
            reads = acc.reads(),
            "response collected"
        );
        Collected::Complete(acc)
    }

    /// Look at the header at the start of one chunk, and at a bare LINK_CLOSE
    /// header at its end.
    ///
    /// Read boundaries only sometimes match message boundaries, so this is a
    /// hint for stopping early; segmentation still decides the content.
    fn inspect_chunk(&self, chunk: &[u8]) -> Option<Completion> {
        if let Ok(header) = ResponseHeader::decode(chunk) {
            if self.options.trace_chunks {
                debug!(
                    command = command_name(header.command),
                    result = header.result,
                    data_len = header.data_len,
                    chunk_len = chunk.len(),
                    "chunk header"
                );
            }
            if header.command == LINK_CLOSE {
                return Some(Completion::LinkClosed);
            }
            if !self.options.require_continue && chunk.len() >= header.message_len() {
                return Some(Completion::SelfContained);
            }
        }

        if chunk.len() > HEADER_SIZE {
            let tail = &chunk[chunk.len() - HEADER_SIZE..];
            if let Ok(header) = ResponseHeader::decode(tail) {
                if header.command == LINK_CLOSE && header.data_len == 0 {
                    return Some(Completion::LinkClosed);
                }
            }
        }
        None
    }
}

/// Split accumulated bytes into message bodies, decrypting each body with
/// `key` when one is given.
pub fn segment_response(raw: &[u8], key: Option<&RequestKey>) -> Segmented {
    match key {
        Some(key) => segment_with(raw, |_, body| decrypt(key.as_bytes(), body)),
        None => segment(raw),
    }
}
