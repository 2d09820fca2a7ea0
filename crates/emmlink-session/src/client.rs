use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use emmlink_cipher::{encrypt, RequestKey};
use emmlink_extract::{extract, ExtractedResponse};
use emmlink_frame::{proto_type, Fallback, RequestHeader, TRAN};
use emmlink_transport::{Connection, Connector, Stream};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ExchangeOptions, Session};
use crate::error::{Result, SessionError};
use crate::handshake::{perform_handshake, Handshake, HandshakeMode};
use crate::reassembly::{segment_response, Collected, Completion, ReassemblyEngine};
use crate::retry::{Clock, SystemClock};
use crate::wire::{io_error, send_request};

/// Connection lifecycle as seen from outside the exchange lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Disconnected,
    Connected,
    Exchanging,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Exchanging,
            _ => Self::Disconnected,
        }
    }
}

/// Byte and read counts for one exchange, over all attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub reads: u64,
    pub attempts: u32,
}

/// A completed exchange.
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub response: ExtractedResponse,
    pub stats: TransferStats,
    pub completion: Completion,
    /// Messages recognized by segmentation.
    pub frames: usize,
    /// Times segmentation skipped garbage to find a header.
    pub resyncs: usize,
    /// Degradation path that ended segmentation, if any.
    pub fallback: Option<Fallback>,
}

struct Link<N: Connection> {
    connection: Option<N>,
    stream: Option<N::Stream>,
    key: Option<RequestKey>,
}

impl<N: Connection> Link<N> {
    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.close() {
                debug!(error = %err, "stream close failed");
            }
        }
    }

    fn close_connection(&mut self) {
        self.close_stream();
        if let Some(mut connection) = self.connection.take() {
            if let Err(err) = connection.close() {
                debug!(error = %err, "connection close failed");
            }
        }
    }
}

struct AttemptFailure {
    error: SessionError,
    partial: Vec<u8>,
    retryable: bool,
}

impl AttemptFailure {
    fn retry(error: SessionError, partial: Vec<u8>) -> Self {
        Self {
            error,
            partial,
            retryable: true,
        }
    }

    fn fatal(error: SessionError, partial: Vec<u8>) -> Self {
        Self {
            error,
            partial,
            retryable: false,
        }
    }
}

/// Client for one logical connection to a peer.
///
/// Every operation holds the client's lock for its whole duration, so at
/// most one connect, handshake, exchange, or close is in flight at a time.
pub struct SessionClient<C: Connector, K: Clock = SystemClock> {
    connector: C,
    session: Session,
    clock: K,
    state: AtomicU8,
    link: Mutex<Link<C::Connection>>,
}

impl<C: Connector> SessionClient<C, SystemClock> {
    pub fn new(connector: C, session: Session) -> Self {
        Self::with_clock(connector, session, SystemClock)
    }
}

impl<C: Connector, K: Clock> SessionClient<C, K> {
    pub fn with_clock(connector: C, session: Session, clock: K) -> Self {
        Self {
            connector,
            session,
            clock,
            state: AtomicU8::new(SessionState::Disconnected as u8),
            link: Mutex::new(Link {
                connection: None,
                stream: None,
                key: None,
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Current state, readable while an exchange is running.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Connect and open a stream, replacing any existing connection.
    pub fn connect(&self, deadline: Option<Instant>) -> Result<()> {
        let mut link = self.lock();
        link.close_connection();
        link.key = None;
        self.set_state(SessionState::Disconnected);

        let result = self.open_link(&mut link, deadline);
        self.sync_state(&link);
        result
    }

    /// Connect, retrying per the session's policy with `interval` between
    /// attempts. Returns the number of attempts used.
    pub fn connect_with_retry(&self, deadline: Option<Instant>) -> Result<u32> {
        let policy = self.session.retry;
        let attempts = policy.attempts();
        let mut last = None;

        for attempt in 1..=attempts {
            match self.connect(deadline) {
                Ok(()) => return Ok(attempt),
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "connect failed");
                    last = Some(err);
                }
            }
            if attempt == attempts {
                break;
            }
            if deadline.is_some_and(|deadline| self.clock.now() + policy.interval >= deadline) {
                debug!("connect deadline leaves no room for another attempt");
                break;
            }
            self.clock.sleep(policy.interval);
        }

        Err(SessionError::RetriesExhausted {
            attempts,
            last: Box::new(last.unwrap_or(SessionError::NotConnected)),
            partial: None,
        })
    }

    /// Run the init exchange on the current stream.
    ///
    /// The encrypted variant stores the derived key for later exchanges.
    pub fn handshake(&self, mode: HandshakeMode, timeout: Duration) -> Result<Handshake> {
        let mut link = self.lock();
        let stream = link.stream.as_mut().ok_or(SessionError::NotConnected)?;
        let handshake = perform_handshake(stream, &self.session, mode, timeout, &self.clock)?;
        link.key = handshake.key.clone();
        Ok(handshake)
    }

    /// Send `payload` and collect the response.
    ///
    /// Transient failures are retried on a fresh stream after a linear
    /// backoff; an application-level close also replaces the connection.
    /// The handshake is not repeated. A failed exchange carries the largest
    /// partial response seen, segmented and extracted like a complete one.
    pub fn exchange(&self, payload: &[u8], options: &ExchangeOptions) -> Result<ExchangeResult> {
        let mut link = self.lock();
        if link.connection.is_none() {
            return Err(SessionError::NotConnected);
        }

        let key = if options.use_encryption {
            Some(link.key.clone().ok_or(SessionError::HandshakeRequired)?)
        } else {
            None
        };
        let body = match &key {
            Some(key) => encrypt(key.as_bytes(), payload)?,
            None => payload.to_vec(),
        };

        self.set_state(SessionState::Exchanging);
        let result = self.exchange_locked(&mut link, &body, key.as_ref(), options);
        self.sync_state(&link);
        result
    }

    /// Close the stream and connection.
    pub fn close(&self) -> Result<()> {
        let mut link = self.lock();
        let mut outcome = Ok(());
        if let Some(mut stream) = link.stream.take() {
            if let Err(err) = stream.close() {
                outcome = Err(err.into());
            }
        }
        if let Some(mut connection) = link.connection.take() {
            if let Err(err) = connection.close() {
                outcome = Err(err.into());
            }
        }
        link.key = None;
        self.set_state(SessionState::Disconnected);
        info!("session closed");
        outcome
    }

    fn exchange_locked(
        &self,
        link: &mut Link<C::Connection>,
        body: &[u8],
        key: Option<&RequestKey>,
        options: &ExchangeOptions,
    ) -> Result<ExchangeResult> {
        let policy = self.session.retry;
        let attempts = options.attempts(&policy);
        let header = RequestHeader::new(TRAN, proto_type::HTTP);
        let mut stats = TransferStats::default();
        let mut partial = Vec::new();
        let mut last = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let pause = policy.backoff(attempt - 1);
                warn!(attempt, attempts, ?pause, "retrying exchange");
                self.clock.sleep(pause);
            }
            stats.attempts = attempt;

            match self.attempt(link, header, body, options, &mut stats) {
                Ok((raw, completion)) => {
                    return self.finish(raw, completion, key, options, stats);
                }
                Err(failure) => {
                    if failure.partial.len() > partial.len() {
                        partial = failure.partial;
                    }
                    if !failure.retryable {
                        return Err(self.fatal_error(failure.error, partial, attempt, key, options));
                    }
                    warn!(attempt, attempts, error = %failure.error, "exchange attempt failed");
                    last = Some(failure.error);
                }
            }
        }

        Err(SessionError::RetriesExhausted {
            attempts,
            last: Box::new(last.unwrap_or(SessionError::NotConnected)),
            partial: salvage(partial, key, options),
        })
    }

    /// Attach the best partial response to an error that ends the exchange
    /// early. A bare error after earlier attempts produced data is reported
    /// as exhaustion so that data still reaches the caller.
    fn fatal_error(
        &self,
        error: SessionError,
        partial: Vec<u8>,
        attempt: u32,
        key: Option<&RequestKey>,
        options: &ExchangeOptions,
    ) -> SessionError {
        match error {
            SessionError::Overflow { received, max, .. } => SessionError::Overflow {
                received,
                max,
                partial: salvage(partial, key, options),
            },
            error if partial.is_empty() => error,
            error => SessionError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
                partial: salvage(partial, key, options),
            },
        }
    }

    /// One write plus read loop. On failure the stream is gone; after an
    /// application close the connection is gone too.
    fn attempt(
        &self,
        link: &mut Link<C::Connection>,
        header: RequestHeader,
        body: &[u8],
        options: &ExchangeOptions,
        stats: &mut TransferStats,
    ) -> std::result::Result<(Vec<u8>, Completion), AttemptFailure> {
        if link.stream.is_none() {
            self.open_link(link, None)
                .map_err(|err| AttemptFailure::retry(err, Vec::new()))?;
        }
        let Some(stream) = link.stream.as_mut() else {
            return Err(AttemptFailure::retry(SessionError::NotConnected, Vec::new()));
        };

        let sent = match send_request(stream, header, body) {
            Ok(sent) => sent,
            Err(err) => {
                self.drop_after_failure(link, &err);
                return Err(AttemptFailure::retry(err, Vec::new()));
            }
        };
        stats.sent_bytes += sent as u64;
        debug!(sent, "request written");

        let engine = ReassemblyEngine::new(options, &self.clock);
        match engine.collect(stream) {
            Collected::Complete(acc) => {
                stats.reads += acc.reads();
                stats.received_bytes += acc.len() as u64;
                let completion = acc.completion().unwrap_or(Completion::Eof);
                let peer_finished = matches!(completion, Completion::Eof | Completion::LinkClosed);
                if !peer_finished {
                    if let Err(err) = stream.set_read_deadline(None) {
                        debug!(error = %err, "could not clear read deadline");
                    }
                }
                if peer_finished {
                    link.close_stream();
                }

                if acc.is_empty() {
                    let err = match completion {
                        Completion::Idle | Completion::IdleTimeout => {
                            SessionError::Timeout(options.idle_threshold)
                        }
                        _ => SessionError::IncompleteResponse(
                            "stream ended without response data".to_string(),
                        ),
                    };
                    return Err(AttemptFailure::fatal(err, Vec::new()));
                }
                Ok((acc.into_raw(), completion))
            }
            Collected::Overflowed(acc) => {
                stats.reads += acc.reads();
                stats.received_bytes += acc.len() as u64;
                link.close_stream();
                let err = SessionError::Overflow {
                    received: acc.len() as u64,
                    max: options.max_download_size,
                    partial: None,
                };
                Err(AttemptFailure::fatal(err, acc.into_raw()))
            }
            Collected::Interrupted { acc, error } => {
                stats.reads += acc.reads();
                stats.received_bytes += acc.len() as u64;
                let err = io_error(error);
                self.drop_after_failure(link, &err);
                Err(AttemptFailure::retry(err, acc.into_raw()))
            }
        }
    }

    fn finish(
        &self,
        raw: Vec<u8>,
        completion: Completion,
        key: Option<&RequestKey>,
        options: &ExchangeOptions,
        stats: TransferStats,
    ) -> Result<ExchangeResult> {
        let segmented = segment_response(&raw, key);
        if segmented.resyncs > 0 || segmented.fallback.is_some() {
            debug!(
                resyncs = segmented.resyncs,
                fallback = ?segmented.fallback,
                "segmentation degraded"
            );
        }
        let frames = segmented.frames.len();
        let response = extract(raw, segmented.pure, &options.extract_options());
        info!(
            ?completion,
            received = stats.received_bytes,
            content = response.content().len(),
            attempts = stats.attempts,
            "exchange complete"
        );
        Ok(ExchangeResult {
            response,
            stats,
            completion,
            frames,
            resyncs: segmented.resyncs,
            fallback: segmented.fallback,
        })
    }

    fn open_link(&self, link: &mut Link<C::Connection>, deadline: Option<Instant>) -> Result<()> {
        if link.connection.is_none() {
            let connection = self.connector.connect(deadline)?;
            info!(server_id = self.session.server_id, "connected");
            link.connection = Some(connection);
        }
        let connection = link.connection.as_mut().ok_or(SessionError::NotConnected)?;
        link.stream = Some(connection.open_stream()?);
        debug!("stream opened");
        Ok(())
    }

    fn drop_after_failure(&self, link: &mut Link<C::Connection>, err: &SessionError) {
        if matches!(err, SessionError::ApplicationClose(_)) {
            warn!("peer closed the connection, reconnecting on next attempt");
            link.close_connection();
        } else {
            link.close_stream();
        }
    }

    fn sync_state(&self, link: &Link<C::Connection>) {
        let state = if link.connection.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        };
        self.set_state(state);
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Link<C::Connection>> {
        self.link
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turn the bytes of a failed exchange into a response, if there are any.
fn salvage(
    raw: Vec<u8>,
    key: Option<&RequestKey>,
    options: &ExchangeOptions,
) -> Option<Box<ExtractedResponse>> {
    if raw.is_empty() {
        return None;
    }
    let segmented = segment_response(&raw, key);
    let response = extract(raw, segmented.pure, &options.extract_options());
    warn!(
        raw = response.raw_data.len(),
        content = response.content().len(),
        md5 = %response.md5,
        "returning partial response with error"
    );
    Some(Box::new(response))
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use emmlink_cipher::decrypt;
    use emmlink_frame::{result, ResponseHeader, HEADER_SIZE, INIT_ACK, TRAN_ACK};

    use super::*;
    use crate::retry::{ManualClock, RetryPolicy};
    use crate::testing::{reply, ScriptedConnection, ScriptedConnector, ScriptedStream};

    const HTTP_OK: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

    fn session(max_attempts: u32) -> Session {
        Session::new(1, "portal", "sid").with_retry(
            RetryPolicy::default()
                .with_max_attempts(max_attempts)
                .with_delay(Duration::from_millis(500)),
        )
    }

    fn tran_ack(body: &[u8]) -> Vec<u8> {
        reply(ResponseHeader::new(TRAN_ACK, 0), body)
    }

    fn client(
        connector: ScriptedConnector,
        max_attempts: u32,
    ) -> (SessionClient<ScriptedConnector, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let client = SessionClient::with_clock(connector, session(max_attempts), clock.clone());
        (client, clock)
    }

    fn failing_stream() -> ScriptedStream {
        ScriptedStream::new().fail(ErrorKind::ConnectionReset)
    }

    fn good_stream() -> ScriptedStream {
        ScriptedStream::new().data(tran_ack(HTTP_OK)).eof()
    }

    #[test]
    fn exchange_extracts_http_body() {
        let stream = good_stream();
        let written = stream.written_handle();
        let (client, _) = client(ScriptedConnector::single([stream]), 3);

        client.connect(None).unwrap();
        assert_eq!(client.state(), SessionState::Connected);

        let result = client
            .exchange(b"GET / HTTP/1.1\r\n\r\n", &ExchangeOptions::default())
            .unwrap();
        assert_eq!(result.response.content(), b"hello");
        assert_eq!(result.response.status_code(), Some(200));
        assert_eq!(result.completion, Completion::Eof);
        assert_eq!(result.stats.attempts, 1);
        assert_eq!(result.stats.received_bytes, (HEADER_SIZE + HTTP_OK.len()) as u64);
        assert_eq!(result.frames, 1);
        assert_eq!(client.state(), SessionState::Connected);

        let written = written.lock().unwrap().clone();
        let header = RequestHeader::decode(&written).unwrap();
        assert_eq!(header.command, TRAN);
        assert_eq!(header.proto_type, proto_type::HTTP);
        assert_eq!(&written[HEADER_SIZE..], b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(result.stats.sent_bytes, written.len() as u64);
    }

    #[test]
    fn third_attempt_succeeds_with_budget_of_three() {
        let connector =
            ScriptedConnector::single([failing_stream(), failing_stream(), good_stream()]);
        let (client, clock) = client(connector, 3);
        client.connect(None).unwrap();

        let result = client.exchange(b"req", &ExchangeOptions::default()).unwrap();
        assert_eq!(result.stats.attempts, 3);
        assert_eq!(result.response.content(), b"hello");
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
    }

    #[test]
    fn budget_of_two_surfaces_last_error() {
        let connector =
            ScriptedConnector::single([failing_stream(), failing_stream(), good_stream()]);
        let (client, _) = client(connector, 2);
        client.connect(None).unwrap();

        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        match &err {
            SessionError::RetriesExhausted { attempts, last, .. } => {
                assert_eq!(*attempts, 2);
                assert!(matches!(**last, SessionError::Io(ref e) if e.kind() == ErrorKind::ConnectionReset));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exchange_options_override_attempts() {
        let connector =
            ScriptedConnector::single([failing_stream(), failing_stream(), good_stream()]);
        let (client, _) = client(connector, 10);
        client.connect(None).unwrap();

        let options = ExchangeOptions {
            max_retries: 2,
            ..ExchangeOptions::default()
        };
        let err = client.exchange(b"req", &options).unwrap_err();
        assert!(matches!(err, SessionError::RetriesExhausted { attempts: 2, .. }));
    }

    #[test]
    fn exhaustion_keeps_largest_partial() {
        let first = ScriptedStream::new()
            .data(tran_ack(b"longer partial"))
            .fail(ErrorKind::ConnectionReset);
        let second = ScriptedStream::new()
            .data(tran_ack(b"short"))
            .fail(ErrorKind::ConnectionReset);
        let (client, _) = client(ScriptedConnector::single([first, second]), 2);
        client.connect(None).unwrap();

        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        assert_eq!(err.partial(), tran_ack(b"longer partial").as_slice());
    }

    #[test]
    fn exhaustion_partial_is_extracted() {
        let partial_http = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel";
        let stream = ScriptedStream::new()
            .data(tran_ack(partial_http))
            .fail(ErrorKind::ConnectionReset);
        let (client, _) = client(ScriptedConnector::single([stream]), 1);
        client.connect(None).unwrap();

        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        let partial = err.partial_response().expect("partial response");
        assert_eq!(partial.pure_data, partial_http);
        assert_eq!(partial.status_code(), Some(200));
        assert_eq!(partial.content(), b"hel");
        assert_eq!(partial.md5, emmlink_cipher::md5_hex(b"hel"));
    }

    #[test]
    fn overflow_returns_partial_without_retry() {
        let stream = ScriptedStream::new()
            .data(tran_ack(b"0123456789"))
            .data(tran_ack(b"abcdefghij"))
            .data(tran_ack(b"never read"));
        let closed = stream.closed_handle();
        let (client, clock) = client(ScriptedConnector::single([stream, good_stream()]), 3);
        client.connect(None).unwrap();

        let options = ExchangeOptions {
            max_download_size: 40,
            ..ExchangeOptions::default()
        };
        let err = client.exchange(b"req", &options).unwrap_err();
        assert!(matches!(err, SessionError::Overflow { received: 60, max: 40, .. }));
        assert_eq!(err.partial().len(), 60);
        assert_eq!(
            err.partial_response().map(|partial| partial.content()),
            Some(&b"0123456789abcdefghij"[..])
        );
        assert!(clock.sleeps().is_empty());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn silent_retry_after_partial_keeps_partial() {
        let clock = ManualClock::new();
        let first = ScriptedStream::new()
            .data(tran_ack(b"half"))
            .fail(ErrorKind::ConnectionReset);
        let silent = ScriptedStream::new()
            .with_clock(clock.clone())
            .timeout_after(Duration::from_secs(31));
        let client = SessionClient::with_clock(
            ScriptedConnector::single([first, silent]),
            session(3),
            clock,
        );
        client.connect(None).unwrap();

        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        match &err {
            SessionError::RetriesExhausted { attempts, last, .. } => {
                assert_eq!(*attempts, 2);
                assert!(matches!(**last, SessionError::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.partial_response().map(|partial| partial.content()),
            Some(&b"half"[..])
        );
    }

    #[test]
    fn application_close_reconnects() {
        let first = ScriptedConnection::new([ScriptedStream::new().app_close()]);
        let second = ScriptedConnection::new([good_stream()]);
        let (client, _) = client(ScriptedConnector::new([Some(first), Some(second)]), 3);
        client.connect(None).unwrap();

        let result = client.exchange(b"req", &ExchangeOptions::default()).unwrap();
        assert_eq!(result.stats.attempts, 2);
        assert_eq!(client.connector().connects(), 2);
    }

    #[test]
    fn write_failure_is_retried() {
        let broken = ScriptedStream::new().fail_writes(ErrorKind::BrokenPipe);
        let (client, _) = client(ScriptedConnector::single([broken, good_stream()]), 3);
        client.connect(None).unwrap();

        let result = client.exchange(b"req", &ExchangeOptions::default()).unwrap();
        assert_eq!(result.stats.attempts, 2);
    }

    #[test]
    fn failed_stream_is_closed() {
        let stream = failing_stream();
        let closed = stream.closed_handle();
        let (client, _) = client(ScriptedConnector::single([stream, good_stream()]), 2);
        client.connect(None).unwrap();

        client.exchange(b"req", &ExchangeOptions::default()).unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn silent_peer_is_timeout_not_empty_success() {
        let clock = ManualClock::new();
        let silent = ScriptedStream::new()
            .with_clock(clock.clone())
            .timeout_after(Duration::from_secs(31));
        let client =
            SessionClient::with_clock(ScriptedConnector::single([silent]), session(3), clock);
        client.connect(None).unwrap();

        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
    }

    #[test]
    fn immediate_eof_is_incomplete() {
        let (client, _) = client(ScriptedConnector::single([ScriptedStream::new().eof()]), 3);
        client.connect(None).unwrap();
        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        assert!(matches!(err, SessionError::IncompleteResponse(_)));
    }

    #[test]
    fn exchange_requires_connection() {
        let (client, _) = client(ScriptedConnector::single([]), 1);
        let err = client.exchange(b"req", &ExchangeOptions::default()).unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[test]
    fn encrypted_exchange_requires_encrypted_handshake() {
        let (client, _) = client(ScriptedConnector::single([good_stream()]), 1);
        client.connect(None).unwrap();
        let options = ExchangeOptions {
            use_encryption: true,
            ..ExchangeOptions::default()
        };
        let err = client.exchange(b"req", &options).unwrap_err();
        assert!(matches!(err, SessionError::HandshakeRequired));
    }

    #[test]
    fn encrypted_handshake_then_exchange() {
        let stream = ScriptedStream::new()
            .data(reply(ResponseHeader::new(INIT_ACK, result::SUCCESS), b""))
            .data(tran_ack(b"plain reply"))
            .eof();
        let written = stream.written_handle();
        let (client, _) = client(ScriptedConnector::single([stream]), 1);
        client.connect(None).unwrap();

        let handshake = client
            .handshake(HandshakeMode::Encrypted, Duration::from_secs(5))
            .unwrap();
        let key = handshake.key.clone().unwrap();

        let options = ExchangeOptions {
            use_encryption: true,
            ..ExchangeOptions::default()
        };
        let payload = b"0123456789abcdef";
        let result = client.exchange(payload, &options).unwrap();
        // Not a block multiple, so the body cannot be decrypted and is kept.
        assert_eq!(result.response.content(), b"plain reply");

        let written = written.lock().unwrap().clone();
        let init = RequestHeader::decode(&written).unwrap();
        let tran_at = HEADER_SIZE + init.data_len as usize;
        let tran = RequestHeader::decode(&written[tran_at..]).unwrap();
        assert_eq!(tran.command, TRAN);
        let body = &written[tran_at + HEADER_SIZE..];
        assert_eq!(decrypt(key.as_bytes(), body).unwrap(), payload);
    }

    #[test]
    fn connect_with_retry_sleeps_interval() {
        let connector = ScriptedConnector::new([
            None,
            None,
            Some(ScriptedConnection::new([good_stream()])),
        ]);
        let (client, clock) = client(connector, 5);

        assert_eq!(client.connect_with_retry(None).unwrap(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
        assert_eq!(client.state(), SessionState::Connected);
    }

    #[test]
    fn connect_with_retry_exhausts() {
        let (client, _) = client(ScriptedConnector::new([None, None]), 2);
        let err = client.connect_with_retry(None).unwrap_err();
        assert!(matches!(err.root(), SessionError::Connection(_)));
        assert_eq!(client.connector().connects(), 2);
    }

    #[test]
    fn close_resets_state() {
        let (client, _) = client(ScriptedConnector::single([good_stream()]), 1);
        client.connect(None).unwrap();
        client.close().unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(matches!(
            client.exchange(b"req", &ExchangeOptions::default()),
            Err(SessionError::NotConnected)
        ));
    }

    #[test]
    fn handshake_without_connection_fails() {
        let (client, _) = client(ScriptedConnector::single([]), 1);
        let err = client
            .handshake(HandshakeMode::Json, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }
}
