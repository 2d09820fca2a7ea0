use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use emmlink_extract::ExtractedResponse;
use emmlink_session::{request, ExchangeOptions, RetryPolicy, Session};
use emmlink_transport::TcpConnector;
use tracing::{info, warn};

use crate::cmd::SendArgs;
use crate::exit::{io_error, session_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_outcome, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let addr = resolve_addr(&args.addr)?;
    let payload = resolve_payload(&args)?;
    let options = exchange_options(&args)?;
    let session = session(&args)?;
    let connector =
        TcpConnector::new(addr).with_connect_timeout(parse_duration(&args.connect_timeout)?);

    let outcome = match request(
        connector,
        session,
        &payload,
        &options,
        args.assertion.as_deref(),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(partial) = err.partial_response() {
                report_partial(&args, partial)?;
            }
            return Err(session_error("request failed", err));
        }
    };

    let saved = match &args.save_dir {
        Some(dir) => Some(save_content(dir, &args.prefix, &outcome.result.response)?),
        None => None,
    };
    print_outcome(&outcome, addr, saved.as_deref(), format);

    if outcome.assertion_passed {
        Ok(SUCCESS)
    } else {
        eprintln!("assertion failed: response does not contain the expected text");
        Ok(FAILURE)
    }
}

fn resolve_addr(input: &str) -> CliResult<SocketAddr> {
    let mut addrs = input
        .to_socket_addrs()
        .map_err(|err| CliError::new(USAGE, format!("invalid address {input}: {err}")))?;
    addrs
        .next()
        .ok_or_else(|| CliError::new(USAGE, format!("address {input} resolved to nothing")))
}

fn resolve_payload(args: &SendArgs) -> CliResult<String> {
    if let Some(data) = &args.data {
        return Ok(data.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::new(USAGE, "one of --data or --file is required"))
}

fn session(args: &SendArgs) -> CliResult<Session> {
    let mut retry = RetryPolicy::default().with_delay(parse_duration(&args.retry_delay)?);
    if let Some(attempts) = args.max_retries {
        retry = retry.with_max_attempts(attempts);
    }
    let session = Session::new(args.server_id, &args.server_name, &args.session_id);
    let session = match &args.app_name {
        Some(name) => session.with_app_name(name),
        None => session,
    };
    Ok(session.with_retry(retry))
}

fn exchange_options(args: &SendArgs) -> CliResult<ExchangeOptions> {
    Ok(ExchangeOptions {
        use_encryption: args.encrypt,
        max_retries: args.max_retries.unwrap_or(0),
        read_timeout: parse_duration(&args.read_timeout)?,
        streaming_read_timeout: parse_duration(&args.streaming_read_timeout)?,
        idle_threshold: parse_duration(&args.idle_threshold)?,
        detect_http: !args.no_detect_http,
        max_download_size: args.max_download_size,
        require_continue: !args.single_message,
        repair_inline_headers: args.repair_inline_headers,
        trace_chunks: args.trace_chunks,
        handshake_timeout: parse_duration(&args.handshake_timeout)?,
    })
}

/// Surface data salvaged from a failed exchange before the error is returned.
fn report_partial(args: &SendArgs, partial: &ExtractedResponse) -> CliResult<()> {
    warn!(
        size = partial.content().len(),
        raw = partial.raw_data.len(),
        md5 = %partial.md5,
        "request failed after receiving partial data"
    );
    eprintln!(
        "partial response: {} bytes (md5 {})",
        partial.content().len(),
        partial.md5
    );
    if let Some(dir) = &args.save_dir {
        let path = save_content(dir, &format!("{}_partial", args.prefix), partial)?;
        eprintln!("partial response saved to {}", path.display());
    }
    Ok(())
}

/// Write the response content to `<dir>/<prefix>_<md5>.bin`.
fn save_content(dir: &Path, prefix: &str, response: &ExtractedResponse) -> CliResult<PathBuf> {
    fs::create_dir_all(dir)
        .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    let path = dir.join(format!("{prefix}_{}.bin", response.md5));
    fs::write(&path, response.content())
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
    info!(path = %path.display(), size = response.content().len(), "response saved");
    Ok(path)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
