//! Persistent key ring
//!
//! Unlike the contact snapshot, a corrupt key ring is an error: silently
//! dropping our own day keys would make every pending exchange undecryptable.

use std::sync::Mutex;

use tracing::info;
use trace_core::{Day, KeyRing};

use crate::backend::{FileBackend, PersistenceBackend};
use crate::Result;

/// Lock-serialized storage for this device's [`KeyRing`]
pub struct KeyRingStore {
    backend: Mutex<Box<dyn PersistenceBackend>>,
}

impl KeyRingStore {
    pub fn new(backend: impl PersistenceBackend + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
        }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(FileBackend::new(path))
    }

    /// Load the key ring; a missing blob is an empty ring
    pub fn load(&self) -> Result<KeyRing> {
        let backend = self.backend.lock().unwrap_or_else(|p| p.into_inner());
        Self::load_from(&**backend)
    }

    /// Load, mutate and save under one lock acquisition
    pub fn update<T>(&self, f: impl FnOnce(&mut KeyRing) -> T) -> Result<T> {
        let mut backend = self.backend.lock().unwrap_or_else(|p| p.into_inner());
        let mut ring = Self::load_from(&**backend)?;
        let value = f(&mut ring);
        backend.save(&bincode::serialize(&ring)?)?;
        Ok(value)
    }

    /// Make sure a key exists for `day`; returns its hex form
    pub fn ensure_day(&self, day: Day) -> Result<String> {
        self.update(|ring| ring.get_or_generate(day).to_hex())
    }

    /// Drop keys for days before `oldest_day`
    pub fn prune_before(&self, oldest_day: Day) -> Result<usize> {
        let removed = self.update(|ring| ring.prune_before(oldest_day))?;
        if removed > 0 {
            info!(removed, oldest_day, "Pruned expired day keys");
        }
        Ok(removed)
    }

    fn load_from(backend: &dyn PersistenceBackend) -> Result<KeyRing> {
        match backend.load()? {
            Some(data) => Ok(bincode::deserialize(&data)?),
            None => Ok(KeyRing::new()),
        }
    }
}
