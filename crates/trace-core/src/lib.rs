//! trace-core: Day-keyed primitives for private contact matching
//!
//! This crate provides:
//! - UTC day bucketing shared with the key distribution backend
//! - Per-day secret keys and the local key ring
//! - The authenticated tag construction used to match contacts against
//!   published infection keys
//! - Recovery of pseudonymous ids exchanged out-of-band
//!
//! # Privacy Model
//!
//! Nothing in this crate talks to a server. A peer hands over a tag sealed
//! with its secret key for the day of the encounter; the tag is opaque until
//! the peer publishes that day's key. Matching re-opens the tag with the
//! published key and succeeds only for the right key *and* the right day.

mod cipher;
pub mod day;
mod error;
pub mod identity;
pub mod key;
pub mod tag;

pub use day::{day_number, day_start_ms, DAY_MS};
pub use error::CryptoError;
pub use identity::{recover_pseudonym, seal_pseudonym};
pub use key::{DayKey, InfectionKey, KeyBatch, KeyRing, KEY_SIZE};
pub use tag::{matches, seal_tag, TAG_MARKER};

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Epoch milliseconds, as delivered by the acquisition layer
pub type TimestampMs = i64;

/// Day number (whole UTC days since the Unix epoch)
pub type Day = i64;
