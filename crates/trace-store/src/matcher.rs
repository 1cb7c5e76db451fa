//! Matching engine: flags contacts covered by published infection keys

use std::sync::Arc;

use tracing::{debug, info, warn};
use trace_core::{matches, KeyBatch};

use crate::model::{Contact, Store};
use crate::store::ContactStore;
use crate::StoreError;

/// Outcome of one matching pass
#[derive(Debug, Default)]
pub struct MatchReport {
    /// Every contact matched in this pass, in iteration (ascending id) order
    pub matched: Vec<Contact>,
    /// Last contact matched in this pass
    pub last_match: Option<Contact>,
    /// Set when the store could not be read, or the flags were computed but
    /// could not be saved
    pub persist_error: Option<StoreError>,
}

impl MatchReport {
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

/// Flag every contact in `store` whose first-day tag opens under a key
/// published for that day; returns the matched contacts in iteration order
///
/// Flags are only ever raised. A contact already flagged that matches again
/// is reported again.
pub fn match_contacts(store: &mut Store, batch: &KeyBatch) -> Vec<Contact> {
    let by_day = batch.by_day();
    let mut matched = Vec::new();

    for (id, health) in store.iter_mut() {
        let day = health.contact.day();
        let Some(keys) = by_day.get(&day) else {
            continue;
        };

        let first_tst = health.contact.first_seen();
        if keys.iter().any(|key| matches(id, first_tst, key)) {
            debug!(id = %id, day, "Contact matched infection key");
            health.mark_infected();
            matched.push(health.contact.clone());
        }
    }

    matched
}

/// Runs matching passes against a shared [`ContactStore`]
#[derive(Clone)]
pub struct Matcher {
    store: Arc<ContactStore>,
}

impl Matcher {
    pub fn new(store: Arc<ContactStore>) -> Self {
        Self { store }
    }

    /// Match a key batch; returns the last matched contact, if any
    ///
    /// When several contacts match in one pass only the last (highest id)
    /// is returned. Use [`Matcher::match_report`] to see all of them.
    pub fn match_keys(&self, batch: &KeyBatch) -> Option<Contact> {
        self.match_report(batch).last_match
    }

    /// Match a key batch and report every match plus the persistence outcome
    pub fn match_report(&self, batch: &KeyBatch) -> MatchReport {
        if batch.is_empty() {
            return MatchReport::default();
        }

        let (matched, persisted) =
            match self.store.transaction(|store| match_contacts(store, batch)) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Matching pass skipped, contact store unreadable");
                    return MatchReport {
                        persist_error: Some(e),
                        ..MatchReport::default()
                    };
                }
            };

        info!(
            keys = batch.len(),
            matched = matched.len(),
            persisted = persisted.is_ok(),
            "Matching pass complete"
        );

        MatchReport {
            last_match: matched.last().cloned(),
            matched,
            persist_error: persisted.err(),
        }
    }

    pub fn store(&self) -> &Arc<ContactStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, PersistenceBackend};
    use crate::model::Encounter;
    use crate::Result;
    use trace_core::{day_start_ms, seal_tag, DayKey, InfectionKey, DAY_MS};

    struct ReadOnlyBackend(MemoryBackend);

    impl PersistenceBackend for ReadOnlyBackend {
        fn load(&self) -> Result<Option<Vec<u8>>> {
            self.0.load()
        }

        fn save(&mut self, _data: &[u8]) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
    }

    fn enc(tst: i64) -> Encounter {
        Encounter::new(Some(-70), 0.0, 0.0, 1, tst)
    }

    fn batch(day: i64, key: &DayKey) -> KeyBatch {
        KeyBatch::new(vec![InfectionKey::new(day, key.clone())])
    }

    #[test]
    fn test_match_then_wrong_key_keeps_flag() {
        let store = Arc::new(ContactStore::in_memory());
        let matcher = Matcher::new(Arc::clone(&store));

        let k_correct = DayKey::random();
        let id = seal_tag(&k_correct, 100).unwrap();
        store.add_encounter(&id, enc(day_start_ms(100) + 1000)).unwrap();

        let found = matcher.match_keys(&batch(100, &k_correct)).unwrap();
        assert_eq!(found.id(), id);
        assert!(store.get_all().get(&id).unwrap().is_infected());

        assert!(matcher.match_keys(&batch(100, &DayKey::random())).is_none());
        assert!(store.get_all().get(&id).unwrap().is_infected());
    }

    #[test]
    fn test_key_for_other_day_does_not_match() {
        let store = Arc::new(ContactStore::in_memory());
        let matcher = Matcher::new(Arc::clone(&store));

        let key = DayKey::random();
        let id = seal_tag(&key, 100).unwrap();
        store.add_encounter(&id, enc(day_start_ms(100))).unwrap();

        assert!(matcher.match_keys(&batch(101, &key)).is_none());
        assert!(matcher.match_keys(&batch(99, &key)).is_none());
        assert!(!store.get_all().get(&id).unwrap().is_infected());
    }

    #[test]
    fn test_day_comes_from_first_encounter() {
        let store = Arc::new(ContactStore::in_memory());
        let matcher = Matcher::new(Arc::clone(&store));

        let key = DayKey::random();
        let id = seal_tag(&key, 100).unwrap();
        store.add_encounter(&id, enc(day_start_ms(100) + DAY_MS - 1)).unwrap();
        store.add_encounter(&id, enc(day_start_ms(101) + 10)).unwrap();

        // Day 101 is when the contact was last seen, not first
        assert!(matcher.match_keys(&batch(101, &key)).is_none());
        assert!(matcher.match_keys(&batch(100, &key)).is_some());
    }

    #[test]
    fn test_matching_is_idempotent() {
        let store = Arc::new(ContactStore::in_memory());
        let matcher = Matcher::new(Arc::clone(&store));

        let key = DayKey::random();
        let infected_id = seal_tag(&key, 5).unwrap();
        let clean_id = seal_tag(&DayKey::random(), 5).unwrap();
        store.add_encounter(&infected_id, enc(day_start_ms(5))).unwrap();
        store.add_encounter(&clean_id, enc(day_start_ms(5))).unwrap();

        matcher.match_keys(&batch(5, &key));
        let first = store.get_all();
        matcher.match_keys(&batch(5, &key));
        let second = store.get_all();

        assert_eq!(first, second);
        assert_eq!(second.infected_contacts().count(), 1);
    }

    #[test]
    fn test_last_match_wins_but_report_has_all() {
        let store = Arc::new(ContactStore::in_memory());
        let matcher = Matcher::new(Arc::clone(&store));

        let key_a = DayKey::random();
        let key_b = DayKey::random();
        let id_a = seal_tag(&key_a, 9).unwrap();
        let id_b = seal_tag(&key_b, 9).unwrap();
        store.add_encounter(&id_a, enc(day_start_ms(9))).unwrap();
        store.add_encounter(&id_b, enc(day_start_ms(9))).unwrap();

        let keys = KeyBatch::new(vec![
            InfectionKey::new(9, key_a),
            InfectionKey::new(9, key_b),
        ]);
        let report = matcher.match_report(&keys);

        assert_eq!(report.matched.len(), 2);
        let highest = std::cmp::max(id_a.clone(), id_b.clone());
        assert_eq!(report.last_match.unwrap().id(), highest);
        assert!(report.persist_error.is_none());
    }

    #[test]
    fn test_match_returned_even_if_save_fails() {
        let key = DayKey::random();
        let id = seal_tag(&key, 3).unwrap();

        let mut seeded = Store::new();
        seeded.add_encounter(&id, enc(day_start_ms(3)));
        let data = crate::store::encode(&seeded).unwrap();

        let store = Arc::new(ContactStore::new(ReadOnlyBackend(MemoryBackend::with_data(
            data,
        ))));
        let matcher = Matcher::new(Arc::clone(&store));

        let report = matcher.match_report(&batch(3, &key));
        assert_eq!(report.last_match.as_ref().map(|c| c.id()), Some(id.as_str()));
        assert!(!report.is_persisted());

        // Flag did not survive, so the next batch recomputes it
        assert!(!store.get_all().get(&id).unwrap().is_infected());
        assert!(matcher.match_keys(&batch(3, &key)).is_some());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = Arc::new(ContactStore::in_memory());
        store.add_encounter("x", enc(0)).unwrap();
        let report = Matcher::new(store).match_report(&KeyBatch::default());
        assert!(report.matched.is_empty());
        assert!(report.last_match.is_none());
    }

    #[test]
    fn test_unreadable_store_reports_error_without_matches() {
        struct UnreadableBackend;

        impl PersistenceBackend for UnreadableBackend {
            fn load(&self) -> Result<Option<Vec<u8>>> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "EIO").into())
            }

            fn save(&mut self, _data: &[u8]) -> Result<()> {
                panic!("store must not be written after a failed read");
            }
        }

        let key = DayKey::random();
        let matcher = Matcher::new(Arc::new(ContactStore::new(UnreadableBackend)));
        let report = matcher.match_report(&batch(3, &key));

        assert!(report.matched.is_empty());
        assert!(report.last_match.is_none());
        assert!(matches!(report.persist_error, Some(StoreError::Io(_))));
    }
}
