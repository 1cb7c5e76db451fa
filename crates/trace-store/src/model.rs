//! Contact data model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use trace_core::{day_number, Day, TimestampMs};

/// One observed proximity event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    /// Signal strength, absent for non-BLE encounters (QR, manual)
    pub rssi: Option<i32>,
    pub lat: f64,
    pub lng: f64,
    /// Location accuracy indicator from the acquisition layer
    pub accuracy: i32,
    /// Epoch milliseconds
    pub tst: TimestampMs,
}

impl Encounter {
    pub fn new(rssi: Option<i32>, lat: f64, lng: f64, accuracy: i32, tst: TimestampMs) -> Self {
        Self {
            rssi,
            lat,
            lng,
            accuracy,
            tst,
        }
    }
}

/// A distinct pseudonymous party and every encounter with it
///
/// Always holds at least one encounter: the constructor takes the first
/// one, and decoding a contact with none fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContact")]
pub struct Contact {
    id: String,
    encounters: Vec<Encounter>,
}

#[derive(Deserialize)]
struct RawContact {
    id: String,
    encounters: Vec<Encounter>,
}

impl TryFrom<RawContact> for Contact {
    type Error = String;

    fn try_from(raw: RawContact) -> Result<Self, Self::Error> {
        if raw.encounters.is_empty() {
            return Err(format!("contact {} has no encounters", raw.id));
        }
        Ok(Self {
            id: raw.id,
            encounters: raw.encounters,
        })
    }
}

impl Contact {
    pub fn new(id: impl Into<String>, first: Encounter) -> Self {
        Self {
            id: id.into(),
            encounters: vec![first],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Encounters in insertion order
    pub fn encounters(&self) -> &[Encounter] {
        &self.encounters
    }

    /// The first encounter defines the contact's day for expiry and matching
    pub fn first_encounter(&self) -> &Encounter {
        &self.encounters[0]
    }

    /// Most recent sighting, used for map markers
    pub fn last_encounter(&self) -> &Encounter {
        &self.encounters[self.encounters.len() - 1]
    }

    pub fn first_seen(&self) -> TimestampMs {
        self.first_encounter().tst
    }

    pub fn day(&self) -> Day {
        day_number(self.first_seen())
    }

    pub(crate) fn push(&mut self, encounter: Encounter) {
        self.encounters.push(encounter);
    }
}

/// A contact plus its exposure status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactHealth {
    pub contact: Contact,
    infected: bool,
}

impl ContactHealth {
    pub fn new(contact: Contact) -> Self {
        Self {
            contact,
            infected: false,
        }
    }

    pub fn is_infected(&self) -> bool {
        self.infected
    }

    /// Flag the contact as an exposure. There is no way back.
    pub fn mark_infected(&mut self) {
        self.infected = true;
    }
}

/// Snapshot of every contact, keyed by pseudonymous id
///
/// Iteration is in ascending id order. Every entry is keyed by its own
/// contact's id; decoding a map where the two differ fails.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, ContactHealth>")]
pub struct Store {
    contacts: BTreeMap<String, ContactHealth>,
}

impl Serialize for Store {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.contacts.serialize(serializer)
    }
}

impl TryFrom<BTreeMap<String, ContactHealth>> for Store {
    type Error = String;

    fn try_from(contacts: BTreeMap<String, ContactHealth>) -> Result<Self, Self::Error> {
        if let Some((key, health)) = contacts.iter().find(|(k, h)| *k != h.contact.id()) {
            return Err(format!(
                "contact {} stored under id {}",
                health.contact.id(),
                key
            ));
        }
        Ok(Self { contacts })
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ContactHealth> {
        self.contacts.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ContactHealth> {
        self.contacts.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.contacts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContactHealth)> {
        self.contacts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut ContactHealth)> {
        self.contacts.iter_mut()
    }

    /// Contacts already flagged as exposures
    pub fn infected_contacts(&self) -> impl Iterator<Item = &ContactHealth> {
        self.contacts.values().filter(|h| h.is_infected())
    }

    /// Append to the contact for `id`, creating it on first sight
    pub fn add_encounter(&mut self, id: &str, encounter: Encounter) {
        match self.contacts.get_mut(id) {
            Some(health) => health.contact.push(encounter),
            None => {
                self.contacts
                    .insert(id.to_string(), ContactHealth::new(Contact::new(id, encounter)));
            }
        }
    }

    /// Drop every contact first seen more than `retention_ms` before `now_ms`
    ///
    /// Returns the number of contacts removed.
    pub fn remove_expired(&mut self, now_ms: TimestampMs, retention_ms: i64) -> usize {
        let threshold = now_ms.saturating_sub(retention_ms);
        let before = self.contacts.len();
        self.contacts
            .retain(|_, health| health.contact.first_seen() >= threshold);
        before - self.contacts.len()
    }
}

/// Keys each entry by its contact's id; a later duplicate replaces an earlier one
impl FromIterator<ContactHealth> for Store {
    fn from_iter<I: IntoIterator<Item = ContactHealth>>(iter: I) -> Self {
        Self {
            contacts: iter
                .into_iter()
                .map(|health| (health.contact.id().to_string(), health))
                .collect(),
        }
    }
}
