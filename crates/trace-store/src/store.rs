//! Contact store
//!
//! ## Snapshot format
//! ```text
//! [magic:4 "CTS1"][version:2 LE][bincode(Store)]
//! ```
//! Loading anything else (bad magic, unknown version, undecodable payload)
//! yields an empty store. That reset is intentional and logged at `warn`.
//! A failed read is not a reset: mutations abort without writing.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};
use trace_core::TimestampMs;

use crate::backend::{FileBackend, MemoryBackend, PersistenceBackend};
use crate::model::{Encounter, Store};
use crate::{Result, StoreError};

/// Snapshot magic bytes
pub const STORE_MAGIC: [u8; 4] = *b"CTS1";

/// Snapshot format version
pub const STORE_VERSION: u16 = 1;

const HEADER_SIZE: usize = 6;

/// Owned, lock-serialized contact store
///
/// Share it as `Arc<ContactStore>`. Every read-modify-write holds the lock
/// for its whole duration.
pub struct ContactStore {
    backend: Mutex<Box<dyn PersistenceBackend>>,
}

impl ContactStore {
    pub fn new(backend: impl PersistenceBackend + 'static) -> Self {
        Self {
            backend: Mutex::new(Box::new(backend)),
        }
    }

    /// Store backed by a snapshot file
    pub fn open(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(FileBackend::new(path))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Decoded snapshot; empty if nothing is stored, the blob is corrupt or
    /// it could not be read
    pub fn get_all(&self) -> Store {
        let backend = self.lock();
        Self::try_load(&**backend).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read contact store");
            Store::new()
        })
    }

    /// Overwrite the stored snapshot with `store`
    pub fn replace_all(&self, store: &Store) -> Result<()> {
        let mut backend = self.lock();
        Self::save_to(&mut **backend, store)
    }

    /// Record an encounter with `id`, merging into an existing contact
    pub fn add_encounter(&self, id: &str, encounter: Encounter) -> Result<()> {
        let ((), persisted) = self.transaction(|store| store.add_encounter(id, encounter))?;
        persisted
    }

    /// Remove contacts first seen more than `retention_ms` before `now_ms`
    ///
    /// Returns the number of contacts removed from the snapshot.
    pub fn remove_expired(&self, now_ms: TimestampMs, retention_ms: i64) -> Result<usize> {
        let (removed, persisted) =
            self.transaction(|store| store.remove_expired(now_ms, retention_ms))?;
        if removed > 0 {
            info!(removed, now_ms, retention_ms, "Removed expired contacts");
        }
        persisted.map(|_| removed)
    }

    /// Load, mutate and save under one lock acquisition
    ///
    /// A read failure aborts before `f` runs and nothing is written. Once
    /// `f` has run its value is returned alongside the save outcome.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Store) -> T,
    ) -> Result<(T, Result<()>)> {
        let mut backend = self.lock();
        let mut store = Self::try_load(&**backend)?;
        let value = f(&mut store);
        let persisted = Self::save_to(&mut **backend, &store);
        Ok((value, persisted))
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn PersistenceBackend>> {
        // Poisoning is harmless: the blob is only ever replaced whole
        self.backend.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Backend errors propagate; an undecodable blob becomes an empty store
    fn try_load(backend: &dyn PersistenceBackend) -> Result<Store> {
        let Some(data) = backend.load()? else {
            return Ok(Store::new());
        };

        match decode(&data) {
            Ok(store) => {
                debug!(contacts = store.len(), "Loaded contact store");
                Ok(store)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    bytes = data.len(),
                    "Contact store is corrupt, resetting to empty"
                );
                Ok(Store::new())
            }
        }
    }

    fn save_to(backend: &mut dyn PersistenceBackend, store: &Store) -> Result<()> {
        let result = encode(store).and_then(|data| backend.save(&data));
        match &result {
            Ok(()) => debug!(contacts = store.len(), "Saved contact store"),
            Err(e) => warn!(error = %e, "Failed to persist contact store"),
        }
        result
    }
}

/// Encode a snapshot with its header
pub fn encode(store: &Store) -> Result<Vec<u8>> {
    let payload = bincode::serialize(store)?;
    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len());
    data.extend_from_slice(&STORE_MAGIC);
    data.extend_from_slice(&STORE_VERSION.to_le_bytes());
    data.extend_from_slice(&payload);
    Ok(data)
}

/// Decode a snapshot, validating its header
pub fn decode(data: &[u8]) -> Result<Store> {
    if data.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt(format!(
            "header too short (need {} bytes, got {})",
            HEADER_SIZE,
            data.len()
        )));
    }
    if data[0..4] != STORE_MAGIC {
        return Err(StoreError::Corrupt("bad magic".to_string()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != STORE_VERSION {
        return Err(StoreError::Version {
            found: version,
            expected: STORE_VERSION,
        });
    }
    Ok(bincode::deserialize(&data[HEADER_SIZE..])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    /// Backend whose writes always fail
    struct ReadOnlyBackend(MemoryBackend);

    impl PersistenceBackend for ReadOnlyBackend {
        fn load(&self) -> Result<Option<Vec<u8>>> {
            self.0.load()
        }

        fn save(&mut self, _data: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    /// Backend whose reads fail while `fail_reads` is set
    struct FlakyReadBackend {
        inner: MemoryBackend,
        fail_reads: Arc<AtomicBool>,
    }

    impl PersistenceBackend for FlakyReadBackend {
        fn load(&self) -> Result<Option<Vec<u8>>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "EACCES");
                return Err(err.into());
            }
            self.inner.load()
        }

        fn save(&mut self, data: &[u8]) -> Result<()> {
            self.inner.save(data)
        }
    }

    fn enc(tst: TimestampMs) -> Encounter {
        Encounter::new(None, 1.0, 2.0, 3, tst)
    }

    #[test]
    fn test_add_and_merge_scenario() {
        let store = ContactStore::in_memory();
        assert!(store.get_all().is_empty());

        store.add_encounter("id1", enc(1000)).unwrap();
        let snapshot = store.get_all();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("id1").unwrap().contact.encounters().len(), 1);
        assert!(!snapshot.get("id1").unwrap().is_infected());

        store.add_encounter("id1", enc(2000)).unwrap();
        let snapshot = store.get_all();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("id1").unwrap().contact.encounters().len(), 2);

        assert_eq!(store.remove_expired(1_000_000, 500).unwrap(), 1);
        assert!(store.get_all().is_empty());

        store.add_encounter("id1", enc(1_000_100)).unwrap();
        let snapshot = store.get_all();
        assert_eq!(snapshot.get("id1").unwrap().contact.encounters().len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacts.bin");

        let store = ContactStore::open(&path);
        store.add_encounter("a", enc(10)).unwrap();
        store.add_encounter("b", enc(20)).unwrap();
        drop(store);

        let reopened = ContactStore::open(&path);
        let snapshot = reopened.get_all();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("b").unwrap().contact.first_seen(), 20);
    }

    #[test]
    fn test_corrupt_blob_loads_empty() {
        let store = ContactStore::new(MemoryBackend::with_data(b"garbage".to_vec()));
        assert!(store.get_all().is_empty());

        // A valid header with a truncated payload is still corrupt
        let mut data = encode(&{
            let mut s = Store::new();
            s.add_encounter("x", enc(1));
            s
        })
        .unwrap();
        data.truncate(data.len() - 3);
        let store = ContactStore::new(MemoryBackend::with_data(data));
        assert!(store.get_all().is_empty());

        // Writes after a reset succeed and replace the corrupt blob
        store.add_encounter("y", enc(2)).unwrap();
        assert_eq!(store.get_all().len(), 1);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut data = encode(&Store::new()).unwrap();
        data[4] = 9;
        assert!(matches!(
            decode(&data),
            Err(StoreError::Version { found: 9, expected: STORE_VERSION })
        ));
    }

    #[test]
    fn test_replace_all_overwrites() {
        let store = ContactStore::in_memory();
        store.add_encounter("old", enc(1)).unwrap();

        let mut replacement = Store::new();
        replacement.add_encounter("new", enc(2));
        store.replace_all(&replacement).unwrap();

        let snapshot = store.get_all();
        assert!(!snapshot.contains("old"));
        assert!(snapshot.contains("new"));
    }

    #[test]
    fn test_persist_failure_is_reported_not_fatal() {
        let store = ContactStore::new(ReadOnlyBackend(MemoryBackend::new()));
        let result = store.add_encounter("id", enc(1));
        assert!(matches!(result, Err(StoreError::Io(_))));

        // The mutation is lost, the store is still usable
        assert!(store.get_all().is_empty());
        assert!(store.remove_expired(100, 10).is_err());
    }

    #[test]
    fn test_concurrent_adds_do_not_lose_updates() {
        let store = Arc::new(ContactStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let id = format!("id{}", i % 5);
                        store.add_encounter(&id, enc(t * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = store.get_all();
        assert_eq!(snapshot.len(), 5);
        let total: usize = snapshot.iter().map(|(_, h)| h.contact.encounters().len()).sum();
        assert_eq!(total, 8 * 25);
    }

    #[test]
    fn test_read_error_aborts_mutation_without_writing() {
        let mut seeded = Store::new();
        for i in 0..10 {
            seeded.add_encounter(&format!("id{}", i), enc(i));
        }
        let fail_reads = Arc::new(AtomicBool::new(true));
        let store = ContactStore::new(FlakyReadBackend {
            inner: MemoryBackend::with_data(encode(&seeded).unwrap()),
            fail_reads: Arc::clone(&fail_reads),
        });

        let added = store.add_encounter("new", enc(100));
        assert!(matches!(added, Err(StoreError::Io(_))));
        let expired = store.remove_expired(1_000_000, 1);
        assert!(matches!(expired, Err(StoreError::Io(_))));
        assert!(store.get_all().is_empty());

        fail_reads.store(false, Ordering::SeqCst);
        let snapshot = store.get_all();
        assert_eq!(snapshot.len(), 10);
        assert!(!snapshot.contains("new"));
    }
}
