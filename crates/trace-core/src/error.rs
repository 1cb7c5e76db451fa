//! Crypto error types

use thiserror::Error;

use crate::Day;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("No key for day {0}")]
    MissingKey(Day),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Malformed payload: {0}")]
    Encoding(String),

    #[error("Encryption failed for day {day}")]
    Encryption { day: Day },

    #[error("Decryption failed for day {day}")]
    Decryption { day: Day },
}
