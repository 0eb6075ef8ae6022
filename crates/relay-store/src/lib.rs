//! relay-store - Persistence interface for the OCPP relay
//!
//! The mediator talks to storage through the narrow [`RelayStore`] contract:
//! configuration rows, charger rows, the per-charger persistent current
//! limit, message-log appends, and user lookup. Any backend that honors the
//! contract is acceptable; [`MemoryStore`] is the reference implementation
//! used by the default daemon mode and the test suites.
//!
//! Message-log appends never sit on the forwarding hot path: the mediator
//! hands records to a [`LogSpool`], a bounded drop-oldest queue drained by a
//! background worker.

pub mod memory;
pub mod spool;
mod store;

pub use memory::MemoryStore;
pub use spool::LogSpool;
pub use store::{RelayStore, StoreError, StoreResult};
