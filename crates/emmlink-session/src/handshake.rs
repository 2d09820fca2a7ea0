use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use emmlink_cipher::{derive_key, encrypt, RequestKey, INIT_KEY};
use emmlink_frame::{
    decode_response, proto_type, result, RequestHeader, ResponseFrame, DATA_PROTO_JSON,
    HEADER_SIZE, INIT, INIT_ACK,
};
use emmlink_transport::{is_timeout, ReadOutcome, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Session;
use crate::error::{Result, SessionError};
use crate::retry::Clock;
use crate::wire::{io_error, send_request};

const REPLY_READ_SIZE: usize = 1024;

/// Upper bound on the init reply body.
pub const MAX_INIT_REPLY: usize = 64 * 1024;

/// Which init message to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMode {
    /// Plain JSON body; request and response bodies stay in clear.
    Json,
    /// Binary body encrypted with the static init key; later bodies use the
    /// key derived from this init's request id and timestamp.
    Encrypted,
}

impl HandshakeMode {
    pub fn for_encryption(use_encryption: bool) -> Self {
        if use_encryption {
            Self::Encrypted
        } else {
            Self::Json
        }
    }
}

/// JSON init body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitInfo {
    #[serde(rename = "serverid")]
    pub server_id: u32,
    #[serde(rename = "protocolType")]
    pub protocol_type: u8,
    #[serde(rename = "appname")]
    pub app_name: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl InitInfo {
    pub fn new(session: &Session, request_id: &str) -> Self {
        Self {
            server_id: session.server_id,
            protocol_type: proto_type::HTTP,
            app_name: session.app_name.clone(),
            request_id: request_id.to_string(),
            session_id: session.wire_session_id(),
        }
    }
}

/// A fully built init message.
#[derive(Clone)]
pub struct InitRequest {
    pub mode: HandshakeMode,
    pub request_id: String,
    pub timestamp: i64,
    pub header: RequestHeader,
    pub body: Vec<u8>,
}

impl fmt::Debug for InitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitRequest")
            .field("mode", &self.mode)
            .field("request_id", &self.request_id)
            .field("timestamp", &self.timestamp)
            .field("header", &self.header)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl InitRequest {
    /// Build an init message for `session` with a fresh request id.
    pub fn new(session: &Session, mode: HandshakeMode) -> Result<Self> {
        Self::with_identity(session, mode, new_request_id(), unix_timestamp())
    }

    /// Build an init message with a caller-chosen request id and timestamp.
    pub fn with_identity(
        session: &Session,
        mode: HandshakeMode,
        request_id: String,
        timestamp: i64,
    ) -> Result<Self> {
        let (header, body) = match mode {
            HandshakeMode::Json => {
                let body = serde_json::to_vec(&InitInfo::new(session, &request_id))?;
                (RequestHeader::new(INIT, DATA_PROTO_JSON), body)
            }
            HandshakeMode::Encrypted => {
                let plain = encode_init_body(session, &request_id, timestamp);
                let body = encrypt(INIT_KEY.as_bytes(), &plain)?;
                (RequestHeader::new(INIT, proto_type::HTTP), body)
            }
        };
        Ok(Self {
            mode,
            request_id,
            timestamp,
            header,
            body,
        })
    }

    /// Key for bodies exchanged after this init.
    pub fn key(&self) -> RequestKey {
        derive_key(&self.request_id, self.timestamp)
    }
}

/// Binary init body: server id, then NUL-terminated server name, session id
/// and request id, then the timestamp.
pub fn encode_init_body(session: &Session, request_id: &str, timestamp: i64) -> Vec<u8> {
    let session_id = session.wire_session_id();
    let mut buf = BytesMut::with_capacity(
        4 + session.server_name.len() + session_id.len() + request_id.len() + 3 + 8,
    );
    buf.put_u32(session.server_id);
    buf.put_slice(session.server_name.as_bytes());
    buf.put_u8(0);
    buf.put_slice(session_id.as_bytes());
    buf.put_u8(0);
    buf.put_slice(request_id.as_bytes());
    buf.put_u8(0);
    buf.put_u64(timestamp as u64);
    buf.to_vec()
}

/// Random version 4 UUID in its hyphenated lowercase form.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// Result of a successful init exchange.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub mode: HandshakeMode,
    pub request_id: String,
    /// Key for later bodies; set for [`HandshakeMode::Encrypted`].
    pub key: Option<RequestKey>,
    /// Reply body, decrypted where possible.
    pub reply_body: Vec<u8>,
    pub sent_bytes: usize,
    pub received_bytes: usize,
}

/// Send an init message on `stream` and validate the single reply.
///
/// Fails with [`SessionError::HandshakeRejected`] unless the reply is
/// `INIT_ACK` with result `SUCCESS`.
pub fn perform_handshake<S, K>(
    stream: &mut S,
    session: &Session,
    mode: HandshakeMode,
    timeout: Duration,
    clock: &K,
) -> Result<Handshake>
where
    S: Stream + ?Sized,
    K: Clock + ?Sized,
{
    let request = InitRequest::new(session, mode)?;
    debug!(?request, "sending init");
    let sent_bytes = send_request(stream, request.header, &request.body)?;

    let (reply, received_bytes) = recv_reply(stream, timeout, clock)?;
    let header = reply.header;
    if header.command != INIT_ACK || header.result != result::SUCCESS {
        warn!(
            command = header.command,
            result = header.result,
            "init rejected"
        );
        return Err(SessionError::HandshakeRejected {
            command: header.command,
            result: header.result,
        });
    }

    let key = match mode {
        HandshakeMode::Json => None,
        HandshakeMode::Encrypted => Some(request.key()),
    };
    let reply_body = match &key {
        Some(key) if !reply.body.is_empty() => {
            emmlink_cipher::decrypt(key.as_bytes(), &reply.body).unwrap_or_else(|err| {
                warn!(error = %err, "could not decrypt init reply, keeping raw body");
                reply.body.to_vec()
            })
        }
        _ => reply.body.to_vec(),
    };

    info!(
        server_id = session.server_id,
        mode = ?mode,
        request_id = %request.request_id,
        "init accepted"
    );
    Ok(Handshake {
        mode,
        request_id: request.request_id,
        key,
        reply_body,
        sent_bytes,
        received_bytes,
    })
}

/// Read until one complete response message is buffered or `timeout` passes.
fn recv_reply<S, K>(stream: &mut S, timeout: Duration, clock: &K) -> Result<(ResponseFrame, usize)>
where
    S: Stream + ?Sized,
    K: Clock + ?Sized,
{
    let deadline = clock.now() + timeout;
    stream.set_read_deadline(Some(deadline))?;

    let mut acc = BytesMut::with_capacity(REPLY_READ_SIZE);
    let mut chunk = [0u8; REPLY_READ_SIZE];

    loop {
        if clock.now() >= deadline {
            return Err(SessionError::Timeout(timeout));
        }

        match stream.read(&mut chunk) {
            Ok(ReadOutcome::Data(n)) => {
                acc.extend_from_slice(&chunk[..n]);
                if acc.len() < HEADER_SIZE {
                    continue;
                }
                if let Some(frame) = decode_response(&acc)? {
                    return Ok((frame, acc.len()));
                }
                if acc.len() > HEADER_SIZE + MAX_INIT_REPLY {
                    return Err(SessionError::Overflow {
                        received: acc.len() as u64,
                        max: (HEADER_SIZE + MAX_INIT_REPLY) as u64,
                        partial: None,
                    });
                }
            }
            Ok(ReadOutcome::Empty) => continue,
            Ok(ReadOutcome::Eof) => {
                return Err(SessionError::IncompleteResponse(format!(
                    "stream ended after {} byte(s) of init reply",
                    acc.len()
                )));
            }
            Err(err) if is_timeout(&err) => continue,
            Err(err) => return Err(io_error(err)),
        }
    }
}
