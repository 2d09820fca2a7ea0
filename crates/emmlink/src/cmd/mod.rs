use clap::{ArgGroup, Args, Subcommand};
use emmlink_session::ExchangeOptions;
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Handshake, send one request, and print the reassembled response.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("payload").required(true).args(["data", "file"])))]
pub struct SendArgs {
    /// Peer address (host:port).
    pub addr: String,
    /// Numeric id of the target server.
    #[arg(long, env = "EMMLINK_SERVER_ID")]
    pub server_id: u32,
    /// Name of the target server.
    #[arg(long, env = "EMMLINK_SERVER_NAME")]
    pub server_name: String,
    /// Session id presented in the init message.
    #[arg(long, env = "EMMLINK_SESSION_ID")]
    pub session_id: String,
    /// Application name for the JSON init. Default: the server name.
    #[arg(long)]
    pub app_name: Option<String>,
    /// Request text. Literal \r\n sequences are sent as CRLF.
    #[arg(long)]
    pub data: Option<String>,
    /// Read request text from file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Use the encrypted handshake and AES-encrypted bodies.
    #[arg(long)]
    pub encrypt: bool,
    /// Total attempts for connect and exchange (default 10).
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Backoff unit between exchange attempts (e.g. 500ms, 1s).
    #[arg(long, default_value = "500ms")]
    pub retry_delay: String,
    /// TCP connect timeout.
    #[arg(long, default_value = "10s")]
    pub connect_timeout: String,
    /// Deadline for the init reply.
    #[arg(long, default_value = "10s")]
    pub handshake_timeout: String,
    /// Deadline for the first response read.
    #[arg(long, default_value = "30s")]
    pub read_timeout: String,
    /// Deadline for each later read once data is flowing.
    #[arg(long, default_value = "5s")]
    pub streaming_read_timeout: String,
    /// Silence after the last data that ends the response.
    #[arg(long, default_value = "30s")]
    pub idle_threshold: String,
    /// Abort when the response grows past this many bytes.
    #[arg(long, default_value_t = ExchangeOptions::DEFAULT_MAX_DOWNLOAD_SIZE)]
    pub max_download_size: u64,
    /// Report the whole payload rather than the HTTP body.
    #[arg(long)]
    pub no_detect_http: bool,
    /// Stop after a read that held one complete message.
    #[arg(long)]
    pub single_message: bool,
    /// Strip inline headers left in the reassembled payload.
    #[arg(long)]
    pub repair_inline_headers: bool,
    /// Log each chunk's leading header (debug level).
    #[arg(long)]
    pub trace_chunks: bool,
    /// Save the response content to DIR/<prefix>_<md5>.bin.
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,
    /// File name prefix used with --save-dir.
    #[arg(long, default_value = "response")]
    pub prefix: String,
    /// Exit 1 unless the response content contains TEXT.
    #[arg(long = "assert", value_name = "TEXT")]
    pub assertion: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
