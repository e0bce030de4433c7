//! Face-swap relay HTTP server library.
//!
//! Exposes config, state, handlers and the router builder so the binary
//! entrypoint and the integration tests share one middleware stack.

pub mod config;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
