//! Domain types for the face-swap job relay.
//!
//! Everything here is free of I/O: the error taxonomy, inline media
//! decoding, the workflow graph and its node stores, the injection
//! planner, and the inbound/outbound job payloads.

pub mod error;
pub mod media;
pub mod planner;
pub mod request;
pub mod workflow;

pub use error::OrchestrationError;
