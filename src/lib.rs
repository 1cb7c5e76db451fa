//! contact-trace: private proximity contact matching
//!
//! Re-exports the workspace crates:
//! - [`trace_core`]: day bucketing, day keys, tag sealing and matching
//! - [`trace_store`]: contact store, persistence and the matching engine

pub use trace_core;
pub use trace_store;
