//! Keyed-match predicate
//!
//! A tag is the fixed [`TAG_MARKER`] sealed with the owner's day key, with
//! the day number bound as associated data. The tag (base64) is the
//! pseudonymous id a peer records. Once the owner's key for that day is
//! published, the peer re-opens the tag: only the same key and the same
//! day authenticate, so a wrong key or a wrong day can never produce a
//! false match.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::cipher;
use crate::day::day_number;
use crate::key::{DayKey, InfectionKey};
use crate::{Day, Result, TimestampMs};

/// Plaintext sealed into every tag
pub const TAG_MARKER: &[u8; 16] = b"contact-trace/v1";

/// Create a pseudonymous id for `day` under `key`
///
/// Each call uses a fresh nonce, so two tags for the same day are unlinkable
/// until the key is published.
pub fn seal_tag(key: &DayKey, day: Day) -> Result<String> {
    let sealed = cipher::seal(key, day, TAG_MARKER)?;
    Ok(STANDARD.encode(sealed))
}

/// Does the contact `id`, first seen at `tst`, belong to the owner of `key`?
///
/// The day is taken from the contact's timestamp, not from `key.day`: a key
/// published for another day fails to authenticate even without the
/// caller's day filter.
pub fn matches(id: &str, tst: TimestampMs, key: &InfectionKey) -> bool {
    let Ok(sealed) = STANDARD.decode(id) else {
        return false;
    };

    match cipher::open(&key.key, day_number(tst), &sealed) {
        Ok(plaintext) => plaintext.as_slice() == TAG_MARKER.as_slice(),
        Err(_) => false,
    }
}
