/// Errors from body encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The cipher rejected the (normalized) key.
    #[error("invalid AES key length {0} (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    /// Ciphertext is empty, shorter than one block, or not block-aligned.
    #[error("invalid ciphertext length {0} (must be a positive multiple of 16)")]
    InvalidCiphertextLength(usize),
}

pub type Result<T> = std::result::Result<T, CipherError>;
