//! End-to-end face-swap job pipeline.
//!
//! Ties the domain types in `facerelay-core` to the engine client in
//! `facerelay-comfyui`: resolve both input images, upload them, inject
//! the returned handles into the workflow template, submit it, wait for
//! output and return the artifacts base64-encoded.

pub mod assets;
pub mod config;
pub mod orchestrator;
pub mod template;

pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
