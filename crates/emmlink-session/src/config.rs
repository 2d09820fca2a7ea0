use std::time::Duration;

use emmlink_extract::ExtractOptions;

use crate::retry::RetryPolicy;

/// Identity presented to the peer for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub server_id: u32,
    pub server_name: String,
    pub session_id: String,
    /// Application name sent in the JSON init. Defaults to the server name.
    pub app_name: String,
    pub retry: RetryPolicy,
}

impl Session {
    /// Prefix the peer expects on the session id inside init messages.
    pub const SESSION_ID_PREFIX: &'static str = "si:";

    pub fn new(server_id: u32, server_name: impl Into<String>, session_id: impl Into<String>) -> Self {
        let server_name = server_name.into();
        Self {
            server_id,
            app_name: server_name.clone(),
            server_name,
            session_id: session_id.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Session id as written in init messages.
    pub fn wire_session_id(&self) -> String {
        format!("{}{}", Self::SESSION_ID_PREFIX, self.session_id)
    }
}

/// Per-exchange behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Use the encrypted handshake and encrypt request/response bodies.
    pub use_encryption: bool,
    /// Attempt budget for this exchange; 0 uses the session's retry policy.
    pub max_retries: u32,
    /// Deadline for the first read after the request is written.
    pub read_timeout: Duration,
    /// Deadline for every later read, once data is flowing.
    pub streaming_read_timeout: Duration,
    /// Silence after the last data that counts as end of response.
    pub idle_threshold: Duration,
    /// Report the HTTP body as content when the payload is HTTP.
    pub detect_http: bool,
    /// Upper bound on accumulated response bytes.
    pub max_download_size: u64,
    /// Keep reading after a read that held one complete message.
    pub require_continue: bool,
    /// Remove inline headers left in the reassembled payload.
    pub repair_inline_headers: bool,
    /// Log every chunk's leading header at debug level.
    pub trace_chunks: bool,
    /// Deadline for the init reply.
    pub handshake_timeout: Duration,
}

impl ExchangeOptions {
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_STREAMING_READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_DOWNLOAD_SIZE: u64 = 4 * 1024 * 1024 * 1024;
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            detect_http: self.detect_http,
            repair_inline_headers: self.repair_inline_headers,
        }
    }

    /// Effective attempt budget given the session's policy.
    pub fn attempts(&self, policy: &RetryPolicy) -> u32 {
        if self.max_retries == 0 {
            policy.attempts()
        } else {
            self.max_retries
        }
    }
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            use_encryption: false,
            max_retries: 0,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            streaming_read_timeout: Self::DEFAULT_STREAMING_READ_TIMEOUT,
            idle_threshold: Self::DEFAULT_IDLE_THRESHOLD,
            detect_http: true,
            max_download_size: Self::DEFAULT_MAX_DOWNLOAD_SIZE,
            require_continue: true,
            repair_inline_headers: false,
            trace_chunks: false,
            handshake_timeout: Self::DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}
