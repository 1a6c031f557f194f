//! HTTP and WebSocket front end for the roulette engine.
//!
//! The binary wires these modules together; they are exposed as a library so
//! integration tests can build the router against a live database.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
