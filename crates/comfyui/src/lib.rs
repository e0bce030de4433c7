//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper, tolerant decoders for the engine's
//! response shapes, and the history polling loop used to wait for a
//! submitted prompt's output images.

pub mod api;
pub mod poll;
pub mod responses;
