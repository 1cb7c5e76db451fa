//! Pseudonym exchange
//!
//! During an encounter the peer sends back a secret: its pseudonymous id
//! sealed with *our* key for the day of the encounter (the key we showed it,
//! e.g. in a scanned code). Opening the secret yields the id to record.
//! Every failure is surfaced; callers must not record a contact from it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cipher;
use crate::day::day_number;
use crate::key::{DayKey, KeyRing};
use crate::{CryptoError, Day, Result, TimestampMs};

/// Recover the pseudonymous id carried by `secret` for an encounter at `tst`
pub fn recover_pseudonym(keyring: &KeyRing, secret: &str, tst: TimestampMs) -> Result<String> {
    let day = day_number(tst);
    let key = keyring.get(day).ok_or(CryptoError::MissingKey(day))?;

    let sealed = STANDARD
        .decode(secret.trim())
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let plaintext = cipher::open(key, day, &sealed)?;

    if plaintext.is_empty() {
        return Err(CryptoError::Encoding("empty pseudonym".to_string()));
    }

    Ok(STANDARD.encode(plaintext))
}

/// Seal raw pseudonym bytes for the holder of `key` (the peer's side of
/// [`recover_pseudonym`])
pub fn seal_pseudonym(key: &DayKey, day: Day, pseudonym: &[u8]) -> Result<String> {
    let sealed = cipher::seal(key, day, pseudonym)?;
    Ok(STANDARD.encode(sealed))
}
