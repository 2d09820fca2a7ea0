use std::borrow::Cow;
use std::time::{Duration, Instant};

use emmlink_transport::Connector;
use tracing::{info, warn};

use crate::client::{ExchangeResult, SessionClient};
use crate::config::{ExchangeOptions, Session};
use crate::error::{Result, SessionError};
use crate::handshake::HandshakeMode;
use crate::retry::{Clock, SystemClock};

/// Outcome of [`request`].
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub result: ExchangeResult,
    /// Wall time from the first connect attempt to the end of the exchange.
    pub elapsed: Duration,
    /// Whether the content contained the expected text. True when no
    /// assertion was given.
    pub assertion_passed: bool,
}

/// Replace literal `\r\n` escape sequences with CRLF.
///
/// Request text typed on a command line or stored in config carries the
/// four characters `\`, `r`, `\`, `n` rather than the control bytes.
pub fn unescape_crlf(text: &str) -> Cow<'_, str> {
    if text.contains("\\r\\n") {
        Cow::Owned(text.replace("\\r\\n", "\r\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Connect, handshake, send `payload`, and close, in one call.
///
/// The handshake variant follows `options.use_encryption`. Sent and received
/// byte counts include the init exchange.
pub fn request<C: Connector>(
    connector: C,
    session: Session,
    payload: &str,
    options: &ExchangeOptions,
    assertion: Option<&str>,
) -> Result<RequestOutcome> {
    request_with_clock(connector, session, payload, options, assertion, SystemClock)
}

/// [`request`] with an explicit clock.
pub fn request_with_clock<C: Connector, K: Clock>(
    connector: C,
    session: Session,
    payload: &str,
    options: &ExchangeOptions,
    assertion: Option<&str>,
    clock: K,
) -> Result<RequestOutcome> {
    validate(&session, payload)?;
    let payload = unescape_crlf(payload);

    let started = clock.now();
    let client = SessionClient::with_clock(connector, session, clock);
    let outcome = run(&client, payload.as_bytes(), options, started);
    if let Err(err) = client.close() {
        warn!(error = %err, "close after request failed");
    }
    let (result, elapsed) = outcome?;

    let assertion_passed = match assertion {
        Some(expected) if !expected.is_empty() => {
            let passed = result.response.content_lossy().contains(expected);
            if !passed {
                warn!(expected, "response does not contain expected text");
            }
            passed
        }
        _ => true,
    };

    Ok(RequestOutcome {
        result,
        elapsed,
        assertion_passed,
    })
}

fn run<C: Connector, K: Clock>(
    client: &SessionClient<C, K>,
    payload: &[u8],
    options: &ExchangeOptions,
    started: Instant,
) -> Result<(ExchangeResult, Duration)> {
    let connect_attempts = client.connect_with_retry(None)?;
    let mode = HandshakeMode::for_encryption(options.use_encryption);
    let handshake = client.handshake(mode, options.handshake_timeout)?;

    let mut result = client.exchange(payload, options)?;
    result.stats.sent_bytes += handshake.sent_bytes as u64;
    result.stats.received_bytes += handshake.received_bytes as u64;

    let elapsed = client.clock().now().saturating_duration_since(started);
    info!(
        connect_attempts,
        ?elapsed,
        sent = result.stats.sent_bytes,
        received = result.stats.received_bytes,
        "request complete"
    );
    Ok((result, elapsed))
}

fn validate(session: &Session, payload: &str) -> Result<()> {
    let missing = [
        (session.server_id == 0, "server id"),
        (session.server_name.is_empty(), "server name"),
        (session.session_id.is_empty(), "session id"),
        (payload.is_empty(), "request content"),
    ];
    match missing.iter().find(|(absent, _)| *absent) {
        Some((_, field)) => Err(SessionError::InvalidRequest(format!("{field} is required"))),
        None => Ok(()),
    }
}
