//! Read-only views of the store for display

use serde::Serialize;
use trace_store::Store;

/// One marker-style row per contact
#[derive(Debug, Serialize, PartialEq)]
pub struct ContactRow<'a> {
    pub id: &'a str,
    pub infected: bool,
    pub first_seen: i64,
    pub last_seen: i64,
    /// Position of the latest sighting
    pub lat: f64,
    pub lng: f64,
    pub encounters: usize,
}

pub fn contact_rows(store: &Store, infected_only: bool) -> Vec<ContactRow<'_>> {
    store
        .iter()
        .filter(|(_, health)| !infected_only || health.is_infected())
        .map(|(id, health)| {
            let contact = &health.contact;
            let last = contact.last_encounter();
            ContactRow {
                id,
                infected: health.is_infected(),
                first_seen: contact.first_seen(),
                last_seen: last.tst,
                lat: last.lat,
                lng: last.lng,
                encounters: contact.encounters().len(),
            }
        })
        .collect()
}
