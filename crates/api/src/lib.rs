//! Reface API server library.
//!
//! Exposes the building blocks (config, state, error handling, job engine,
//! routes, WebSocket feed) so integration tests and the binary entrypoint
//! can both access them.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod system;
pub mod ws;
