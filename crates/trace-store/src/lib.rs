//! trace-store: Proximity contact store and matching engine
//!
//! Contacts are kept in a single snapshot keyed by pseudonymous id. Every
//! mutation is a read-modify-write of the whole snapshot, serialized by the
//! store's lock, so concurrent callers can never lose each other's updates.
//!
//! Failure policy:
//! - A corrupt snapshot loads as an empty store (logged, never fatal)
//! - A failed write is returned and logged; computed results are kept
//! - Crypto failures are never absorbed here; they belong to the caller

pub mod backend;
mod config;
mod error;
pub mod keyring;
pub mod matcher;
pub mod model;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, PersistenceBackend};
pub use config::{StoreConfig, DEFAULT_RETENTION_DAYS};
pub use error::StoreError;
pub use keyring::KeyRingStore;
pub use matcher::{match_contacts, MatchReport, Matcher};
pub use model::{Contact, ContactHealth, Encounter, Store};
pub use store::{ContactStore, STORE_MAGIC, STORE_VERSION};

pub type Result<T> = std::result::Result<T, StoreError>;
