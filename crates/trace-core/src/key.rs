//! Day keys, published infection keys and the local key ring
//!
//! Every device holds one secret [`DayKey`] per UTC day. Tags handed to
//! peers during that day are sealed with it. When the owner is diagnosed,
//! the keys for the relevant days are published as [`InfectionKey`]s.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::day::day_number;
use crate::{CryptoError, Day, TimestampMs};

/// Day key size in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Secret key for a single UTC day, zeroized on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DayKey([u8; KEY_SIZE]);

impl DayKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let decoded = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_SIZE] = decoded.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_SIZE,
                decoded.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DayKey(<redacted>)")
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A day key published by the backend for a diagnosed user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfectionKey {
    pub day: Day,
    pub key: DayKey,
}

impl InfectionKey {
    pub fn new(day: Day, key: DayKey) -> Self {
        Self { day, key }
    }
}

/// Batch of infection keys as delivered by the distribution channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyBatch {
    pub keys: Vec<InfectionKey>,
}

impl KeyBatch {
    pub fn new(keys: Vec<InfectionKey>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Group keys by day for O(1) lookup per contact
    pub fn by_day(&self) -> HashMap<Day, Vec<&InfectionKey>> {
        let mut grouped: HashMap<Day, Vec<&InfectionKey>> = HashMap::new();
        for key in &self.keys {
            grouped.entry(key.day).or_default().push(key);
        }
        grouped
    }
}

/// This device's own day keys, one per day
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRing {
    keys: BTreeMap<Day, DayKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, day: Day, key: DayKey) {
        self.keys.insert(day, key);
    }

    pub fn get(&self, day: Day) -> Option<&DayKey> {
        self.keys.get(&day)
    }

    /// Key for the day containing `tst`
    pub fn key_for_timestamp(&self, tst: TimestampMs) -> Option<&DayKey> {
        self.get(day_number(tst))
    }

    /// Return the key for `day`, generating one if it does not exist yet
    pub fn get_or_generate(&mut self, day: Day) -> &DayKey {
        self.keys.entry(day).or_insert_with(DayKey::random)
    }

    /// Drop keys for days strictly before `oldest_day`; returns how many were removed
    pub fn prune_before(&mut self, oldest_day: Day) -> usize {
        let before = self.keys.len();
        self.keys = self.keys.split_off(&oldest_day);
        before - self.keys.len()
    }

    /// Keys for the given days, as they would be published after a diagnosis
    pub fn export(&self, days: impl IntoIterator<Item = Day>) -> KeyBatch {
        let keys = days
            .into_iter()
            .filter_map(|day| self.get(day).map(|key| InfectionKey::new(day, key.clone())))
            .collect();
        KeyBatch::new(keys)
    }

    pub fn days(&self) -> impl Iterator<Item = Day> + '_ {
        self.keys.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
