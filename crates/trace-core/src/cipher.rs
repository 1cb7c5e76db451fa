//! AES-256-GCM sealing bound to a day number
//!
//! Sealed layout: `nonce (12) || ciphertext || tag (16)`. The day number is
//! authenticated as associated data, so a blob sealed for one day never
//! opens under the same key for another day.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

use crate::key::DayKey;
use crate::{CryptoError, Day};

/// AES-GCM nonce length in bytes
pub(crate) const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag length in bytes
pub(crate) const AUTH_TAG_SIZE: usize = 16;

fn cipher_for(key: &DayKey) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("AES-256 key must be 32 bytes".to_string()))
}

/// Seal `plaintext` under `key`, authenticating `day`
pub(crate) fn seal(key: &DayKey, day: Day, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

    let aad = day.to_le_bytes();
    let ciphertext = cipher_for(key)?
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Encryption { day })?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a blob produced by [`seal`]
pub(crate) fn open(key: &DayKey, day: Day, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE + AUTH_TAG_SIZE {
        return Err(CryptoError::Encoding(format!(
            "sealed payload too short ({} bytes, need at least {})",
            sealed.len(),
            NONCE_SIZE + AUTH_TAG_SIZE
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let aad = day.to_le_bytes();

    cipher_for(key)?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Decryption { day })
}
