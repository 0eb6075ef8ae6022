//! relay-core - Core types for the OCPP relay
//!
//! This crate provides the pieces every other layer shares: the OCPP-J wire
//! codec, the message-log and charger models, the runtime configuration
//! snapshot, the charging-profile payload builders, and the error taxonomy.

pub mod config;
pub mod error;
pub mod frame;
pub mod models;
pub mod profile;

pub use config::RelayConfig;
pub use error::{ProxyError, ProxyResult};
pub use frame::{Frame, FrameKind, MalformedFrame};
pub use models::*;
