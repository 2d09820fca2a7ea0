//! Command words, protocol types, and result codes.
//!
//! Commands 1-7 belong to the session exchange; 200-203 are link management.

/// Heartbeat (TCP links only).
pub const HEART_BEAT: u16 = 1;

/// Link initialization request.
pub const INIT: u16 = 2;

/// Link initialization reply.
pub const INIT_ACK: u16 = 3;

/// Gateway authentication request.
pub const AUTH: u16 = 4;

/// Gateway authentication reply.
pub const AUTH_ACK: u16 = 5;

/// Pass-through transfer request.
pub const TRAN: u16 = 6;

/// Pass-through transfer reply.
pub const TRAN_ACK: u16 = 7;

/// Peer is tearing the link down.
pub const LINK_CLOSE: u16 = 200;

pub const LINK_CLOSE_ACK: u16 = 201;

pub const LINK_HEART_BEAT: u16 = 202;

pub const LINK_HEART_BEAT_ACK: u16 = 203;

/// Returns a human-readable name for a command word.
pub fn command_name(command: u16) -> &'static str {
    match command {
        HEART_BEAT => "HEART_BEAT",
        INIT => "INIT",
        INIT_ACK => "INIT_ACK",
        AUTH => "AUTH",
        AUTH_ACK => "AUTH_ACK",
        TRAN => "TRAN",
        TRAN_ACK => "TRAN_ACK",
        LINK_CLOSE => "LINK_CLOSE",
        LINK_CLOSE_ACK => "LINK_CLOSE_ACK",
        LINK_HEART_BEAT => "LINK_HEART_BEAT",
        LINK_HEART_BEAT_ACK => "LINK_HEART_BEAT_ACK",
        _ => "UNKNOWN",
    }
}

/// Returns true if the command word is one the protocol defines.
pub fn is_known_command(command: u16) -> bool {
    matches!(command, HEART_BEAT..=TRAN_ACK | LINK_CLOSE..=LINK_HEART_BEAT_ACK)
}

/// Application protocol carried by a TRAN request (the `ProtoType` byte).
pub mod proto_type {
    pub const TCP: u8 = 0x01;
    pub const HTTP: u8 = 0x02;
    pub const HTTPS: u8 = 0x03;
    pub const RTSP: u8 = 0x04;
    pub const SIP: u8 = 0x05;
    pub const RTP: u8 = 0x06;
    pub const RTCP: u8 = 0x07;
    pub const H263: u8 = 0x08;
    pub const UDP: u8 = 0x20;
    /// Load-test traffic.
    pub const TEST: u8 = 0x30;
}

/// Body encoding of an INIT request (also carried in the `ProtoType` byte).
pub const DATA_PROTO_BINARY: u8 = 0x00;
pub const DATA_PROTO_JSON: u8 = 0x01;

/// Returns a human-readable name for an application protocol type.
pub fn proto_type_name(proto: u8) -> &'static str {
    match proto {
        proto_type::TCP => "TCP",
        proto_type::HTTP => "HTTP",
        proto_type::HTTPS => "HTTPS",
        proto_type::RTSP => "RTSP",
        proto_type::SIP => "SIP",
        proto_type::RTP => "RTP",
        proto_type::RTCP => "RTCP",
        proto_type::H263 => "H263",
        proto_type::UDP => "UDP",
        proto_type::TEST => "TEST",
        _ => "UNKNOWN",
    }
}

/// Authentication result codes carried in the response `Result` field.
pub mod result {
    pub const TUNNEL_FORBIDDEN: u16 = 8001;
    pub const SUCCESS: u16 = 8002;
    pub const SESSION_NOT_EXIST: u16 = 8003;
    pub const OVER_FLOW_LIMIT: u16 = 8004;
    pub const USER_FORBIDDEN: u16 = 8007;
    pub const DEVICE_FORBIDDEN: u16 = 8008;
    pub const CONN_FAILED: u16 = 8020;
    pub const UNKNOWN: u16 = 8099;
}

/// Returns a human-readable name for an authentication result code.
pub fn result_name(code: u16) -> &'static str {
    match code {
        result::SUCCESS => "SUCCESS",
        result::TUNNEL_FORBIDDEN => "TUNNEL_FORBIDDEN",
        result::SESSION_NOT_EXIST => "SESSION_NOT_EXIST",
        result::OVER_FLOW_LIMIT => "OVER_FLOW_LIMIT",
        result::USER_FORBIDDEN => "USER_FORBIDDEN",
        result::DEVICE_FORBIDDEN => "DEVICE_FORBIDDEN",
        result::CONN_FAILED => "CONN_FAILED",
        result::UNKNOWN => "UNKNOWN",
        _ => "UNRECOGNIZED",
    }
}
