use std::fmt;

use md5::{Digest, Md5};

/// Static key for the encrypted INIT body. The init reply is encrypted with
/// the per-request key from [`derive_key`] instead.
pub const INIT_KEY: &str = "thiS2023uDpPw$1921#*&Redsdlfkshg";

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Derive the per-request key for `request_id` issued at `timestamp`.
///
/// The key material is the 32-character hex digest itself, so it is used as
/// a 32-byte AES-256 key.
pub fn derive_key(request_id: &str, timestamp: i64) -> RequestKey {
    let seed = format!("{request_id}:#EMM:{timestamp}:@2023*leagsoft");
    RequestKey(md5_hex(seed.as_bytes()))
}

/// Derived key material. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<[u8]> for RequestKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestKey").field(&"<redacted>").finish()
    }
}
