use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::path::Path;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use emmlink_extract::ContentSource;
use emmlink_session::{Completion, RequestOutcome};
use serde::Serialize;

/// Longest content preview shown in table and pretty output.
const PREVIEW_CHARS: usize = 200;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
pub struct ResultOutput {
    addr: String,
    status_code: Option<u16>,
    content_source: &'static str,
    content_size: usize,
    md5: String,
    raw_size: usize,
    pure_size: usize,
    completion: Completion,
    frames: usize,
    resyncs: usize,
    fallback: Option<String>,
    attempts: u32,
    reads: u64,
    sent_bytes: u64,
    received_bytes: u64,
    elapsed_ms: u128,
    assertion_passed: bool,
    saved_to: Option<String>,
    content: String,
}

impl ResultOutput {
    pub fn new(outcome: &RequestOutcome, addr: SocketAddr, saved_to: Option<&Path>) -> Self {
        let result = &outcome.result;
        let response = &result.response;
        Self {
            addr: addr.to_string(),
            status_code: response.status_code(),
            content_source: content_source_name(response.content_source),
            content_size: response.content().len(),
            md5: response.md5.clone(),
            raw_size: response.raw_data.len(),
            pure_size: response.pure_data.len(),
            completion: result.completion,
            frames: result.frames,
            resyncs: result.resyncs,
            fallback: result.fallback.map(|fallback| fallback.to_string()),
            attempts: result.stats.attempts,
            reads: result.stats.reads,
            sent_bytes: result.stats.sent_bytes,
            received_bytes: result.stats.received_bytes,
            elapsed_ms: outcome.elapsed.as_millis(),
            assertion_passed: outcome.assertion_passed,
            saved_to: saved_to.map(|path| path.display().to_string()),
            content: content_preview(response.content()),
        }
    }
}

pub fn print_outcome(
    outcome: &RequestOutcome,
    addr: SocketAddr,
    saved_to: Option<&Path>,
    format: OutputFormat,
) {
    if let OutputFormat::Raw = format {
        print_raw(outcome.result.response.content());
        return;
    }

    let out = ResultOutput::new(outcome, addr, saved_to);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in summary_rows(&out) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={} size={} md5={} completion={} attempts={} elapsed={}ms assert={}",
                optional(out.status_code),
                out.content_size,
                out.md5,
                completion_name(out.completion),
                out.attempts,
                out.elapsed_ms,
                out.assertion_passed
            );
            if let Some(path) = &out.saved_to {
                println!("saved={path}");
            }
            println!("{}", truncate(&out.content));
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn summary_rows(out: &ResultOutput) -> Vec<(&'static str, String)> {
    vec![
        ("addr", out.addr.clone()),
        ("status", optional(out.status_code)),
        ("source", out.content_source.to_string()),
        ("size", out.content_size.to_string()),
        ("md5", out.md5.clone()),
        ("raw / pure", format!("{} / {}", out.raw_size, out.pure_size)),
        ("completion", completion_name(out.completion).to_string()),
        ("frames", out.frames.to_string()),
        ("fallback", out.fallback.clone().unwrap_or_else(|| "-".to_string())),
        ("attempts", out.attempts.to_string()),
        ("sent / received", format!("{} / {}", out.sent_bytes, out.received_bytes)),
        ("elapsed", format!("{}ms", out.elapsed_ms)),
        ("assertion", out.assertion_passed.to_string()),
        ("saved", out.saved_to.clone().unwrap_or_else(|| "-".to_string())),
        ("content", truncate(&out.content)),
    ]
}

fn content_source_name(source: ContentSource) -> &'static str {
    match source {
        ContentSource::HttpBody => "http-body",
        ContentSource::PurePayload => "pure-payload",
    }
}

fn completion_name(completion: Completion) -> &'static str {
    match completion {
        Completion::LinkClosed => "link-closed",
        Completion::SelfContained => "self-contained",
        Completion::Eof => "eof",
        Completion::Idle => "idle",
        Completion::IdleTimeout => "idle-timeout",
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn content_preview(content: &[u8]) -> String {
    match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", content.len()),
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
