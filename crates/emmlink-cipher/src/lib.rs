//! Body encryption for the EMM protocol.
//!
//! Keys are derived per request from the request id and a timestamp, then
//! used as AES-CBC keys with an all-zero IV. Plaintext is zero-padded to the
//! block size on encrypt; decrypt trims a PKCS#7-style trailing length byte.
//! The two sides do not agree for every input, see [`decrypt`].

pub mod aes_cbc;
pub mod error;
pub mod key;

pub use aes_cbc::{decrypt, encrypt, BLOCK_SIZE};
pub use error::{CipherError, Result};
pub use key::{derive_key, md5_hex, RequestKey, INIT_KEY};
