#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use emmlink_frame::{
    encode_response, result, RequestHeader, ResponseHeader, HEADER_SIZE, INIT, INIT_ACK,
    LINK_CLOSE, TRAN, TRAN_ACK,
};

fn read_request(stream: &mut TcpStream) -> (RequestHeader, Vec<u8>) {
    let mut head = [0u8; HEADER_SIZE];
    stream.read_exact(&mut head).expect("request header");
    let header = RequestHeader::decode(&head).expect("valid request header");
    let mut body = vec![0u8; header.data_len as usize];
    stream.read_exact(&mut body).expect("request body");
    (header, body)
}

fn message(command: u16, result: u16, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_response(ResponseHeader::new(command, result), body, &mut buf).expect("encode");
    buf.to_vec()
}

/// Serve one init plus one request, answering with `http` and LINK_CLOSE.
fn http_peer(http: &'static [u8]) -> (SocketAddr, JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let (init, _) = read_request(&mut stream);
        assert_eq!(init.command, INIT);
        stream
            .write_all(&message(INIT_ACK, result::SUCCESS, b"{}"))
            .expect("init ack");

        let (tran, body) = read_request(&mut stream);
        assert_eq!(tran.command, TRAN);
        stream.write_all(&message(TRAN_ACK, 0, http)).expect("response");
        stream
            .write_all(&message(LINK_CLOSE, 0, b""))
            .expect("link close");
        body
    });
    (addr, handle)
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_emmlink"))
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("EMMLINK_SERVER_ID")
        .env_remove("EMMLINK_SERVER_NAME")
        .env_remove("EMMLINK_SESSION_ID")
        .env_remove("EMMLINK_LOG_LEVEL")
        .output()
        .expect("run emmlink")
}

fn send_args(addr: &str) -> Vec<String> {
    [
        "--format",
        "json",
        "send",
        addr,
        "--server-id",
        "12",
        "--server-name",
        "intranet",
        "--session-id",
        "abc",
        "--max-retries",
        "1",
        "--read-timeout",
        "2s",
        "--idle-threshold",
        "1s",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("emmlink-cli-{name}-{}", std::process::id()))
}

#[test]
fn send_prints_json_and_saves_content() {
    let (addr, peer) = http_peer(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world");
    let dir = temp_dir("save");
    let mut args = send_args(&addr.to_string());
    args.extend(
        [
            "--data",
            "GET / HTTP/1.1\\r\\n\\r\\n",
            "--save-dir",
            dir.to_str().expect("utf-8 temp dir"),
            "--prefix",
            "page",
            "--assert",
            "world",
        ]
        .map(String::from),
    );
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = run_cli(&arg_refs);
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(peer.join().expect("peer thread"), b"GET / HTTP/1.1\r\n\r\n");

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is json");
    assert_eq!(json["status_code"], 200);
    assert_eq!(json["content_source"], "http-body");
    assert_eq!(json["content"], "hello world");
    assert_eq!(json["completion"], "link-closed");
    assert_eq!(json["assertion_passed"], true);
    assert_eq!(json["md5"], "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let saved = dir.join("page_5eb63bbbe01eeed093cb22bb8f5acdc3.bin");
    assert_eq!(json["saved_to"], saved.display().to_string());
    assert_eq!(std::fs::read(&saved).expect("saved file"), b"hello world");
    std::fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn failed_assertion_exits_one() {
    let (addr, peer) = http_peer(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nno");
    let mut args = send_args(&addr.to_string());
    args.extend(["--data", "ping", "--assert", "yes"].map(String::from));
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = run_cli(&arg_refs);
    peer.join().expect("peer thread");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("assertion failed"));
}

#[test]
fn overflow_saves_partial_before_failing() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        read_request(&mut stream);
        stream
            .write_all(&message(INIT_ACK, result::SUCCESS, b"{}"))
            .expect("init ack");
        read_request(&mut stream);
        stream
            .write_all(&message(TRAN_ACK, 0, b"0123456789"))
            .expect("first chunk");
        stream
            .write_all(&message(TRAN_ACK, 0, b"abcdefghij"))
            .expect("second chunk");
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let dir = temp_dir("partial");
    let mut args = send_args(&addr.to_string());
    args.extend(
        [
            "--data",
            "ping",
            "--max-download-size",
            "40",
            "--save-dir",
            dir.to_str().expect("utf-8 temp dir"),
            "--prefix",
            "chunk",
        ]
        .map(String::from),
    );
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = run_cli(&arg_refs);
    peer.join().expect("peer thread");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(60), "stderr: {stderr}");
    assert!(stderr.contains("partial response: 20 bytes"), "{stderr}");
    assert!(output.stdout.is_empty());

    let saved = dir.join("chunk_partial_644be06dfc54061fd1e67f5ebbabcd58.bin");
    assert_eq!(std::fs::read(&saved).expect("partial file"), b"0123456789abcdefghij");
    std::fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn rejected_handshake_exits_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    let peer = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        read_request(&mut stream);
        stream
            .write_all(&message(INIT_ACK, result::TUNNEL_FORBIDDEN, b""))
            .expect("init reject");
    });

    let mut args = send_args(&addr.to_string());
    args.extend(["--data", "ping"].map(String::from));
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = run_cli(&arg_refs);
    peer.join().expect("peer thread");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("handshake rejected"));
}

#[test]
fn unreachable_peer_is_a_transport_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        listener.local_addr().expect("local addr")
    };
    let mut args = send_args(&addr.to_string());
    args.extend(["--data", "ping"].map(String::from));
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = run_cli(&arg_refs);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn zero_server_id_is_a_usage_error() {
    let output = run_cli(&[
        "send",
        "127.0.0.1:9",
        "--server-id",
        "0",
        "--server-name",
        "intranet",
        "--session-id",
        "abc",
        "--data",
        "ping",
    ]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("server id is required"));
}

#[test]
fn version_prints_name() {
    let output = run_cli(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("emmlink "), "{stdout}");
}
