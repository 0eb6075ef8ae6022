//! Integration tests for the OCPP relay
//!
//! This crate contains end-to-end tests that exercise the full stack over
//! real sockets:
//! - the charger-facing WebSocket acceptor
//! - the session mediator (forwarding, injection, reconnect, standalone)
//! - the REST control surface
//!
//! # Test Structure
//!
//! - `e2e_test.rs` - Splice scenarios with a scripted charger and a
//!   capturing fake CSMS
//! - `api_integration_test.rs` - REST surface tests against a running relay
//!
//! Everything runs in-process on ephemeral ports; no external services are
//! required.

// This crate only contains tests, no library code
