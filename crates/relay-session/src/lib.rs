//! relay-session - Per-charger session mediation
//!
//! One [`Session`] per connected charger. The mediator owns the splice
//! between the charger socket and the optional upstream CSMS socket: it
//! forwards traffic in both directions, injects operator commands and
//! swallows their responses, keeps the upstream alive with bounded
//! exponential reconnect and an egress buffer, and acts as a minimal CSMS
//! (the standalone responder) when no upstream is available.
//!
//! The [`SessionRegistry`] is the process-wide map from charge point id to
//! live session, shared by the acceptor, the control surface, and background
//! timers.

mod context;
mod registry;
mod responder;
mod session;
mod upstream;

pub use context::RelayContext;
pub use registry::SessionRegistry;
pub use session::Session;
