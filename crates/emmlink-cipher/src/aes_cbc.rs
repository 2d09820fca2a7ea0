use std::borrow::Cow;

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use cbc::{Decryptor, Encryptor};
use md5::{Digest, Md5};
use tracing::trace;

use crate::error::{CipherError, Result};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Keys that are not a valid AES length are replaced by their raw MD5 digest.
fn normalize_key(key: &[u8]) -> Cow<'_, [u8]> {
    match key.len() {
        16 | 24 | 32 => Cow::Borrowed(key),
        _ => Cow::Owned(Md5::digest(key).to_vec()),
    }
}

/// Encrypt `plaintext` with AES-CBC under `key` and a zero IV.
///
/// The plaintext is right-padded with zero bytes to the next block boundary;
/// no padding marker is written, so the original length is not recoverable
/// from the ciphertext alone.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = normalize_key(key);
    let padded_len = plaintext.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut buf = vec![0u8; padded_len];
    buf[..plaintext.len()].copy_from_slice(plaintext);

    match key.len() {
        16 => encrypt_in_place::<Aes128>(&key, &mut buf)?,
        24 => encrypt_in_place::<Aes192>(&key, &mut buf)?,
        32 => encrypt_in_place::<Aes256>(&key, &mut buf)?,
        other => return Err(CipherError::InvalidKeyLength(other)),
    }
    trace!(plaintext_len = plaintext.len(), padded_len, "encrypted body");
    Ok(buf)
}

/// Decrypt AES-CBC `ciphertext` under `key` and a zero IV.
///
/// If the last plaintext byte is in `1..=16` that many trailing bytes are
/// dropped. This does not invert [`encrypt`]'s zero padding: a non-aligned
/// plaintext comes back with its zero fill, and an aligned plaintext whose
/// last byte happens to be small loses bytes.
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::InvalidCiphertextLength(ciphertext.len()));
    }

    let key = normalize_key(key);
    let mut buf = ciphertext.to_vec();
    match key.len() {
        16 => decrypt_in_place::<Aes128>(&key, &mut buf)?,
        24 => decrypt_in_place::<Aes192>(&key, &mut buf)?,
        32 => decrypt_in_place::<Aes256>(&key, &mut buf)?,
        other => return Err(CipherError::InvalidKeyLength(other)),
    }

    if let Some(&last) = buf.last() {
        let pad = last as usize;
        if (1..=BLOCK_SIZE).contains(&pad) {
            buf.truncate(buf.len() - pad);
        }
    }
    trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len = buf.len(),
        "decrypted body"
    );
    Ok(buf)
}

fn encrypt_in_place<C>(key: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let len = buf.len();
    Encryptor::<C>::new_from_slices(key, &ZERO_IV)
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| CipherError::InvalidCiphertextLength(len))?;
    Ok(())
}

fn decrypt_in_place<C>(key: &[u8], buf: &mut [u8]) -> Result<()>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let len = buf.len();
    Decryptor::<C>::new_from_slices(key, &ZERO_IV)
        .map_err(|_| CipherError::InvalidKeyLength(key.len()))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| CipherError::InvalidCiphertextLength(len))?;
    Ok(())
}
