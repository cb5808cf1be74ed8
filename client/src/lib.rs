//! Voice-driven conversational avatar client.
//!
//! Streams a model reply, segments it into speakable sentences,
//! synthesizes them concurrently and plays them back in order while
//! keeping the on-screen transcript in step with the audio.

pub mod config;
pub mod error;
pub mod push;
pub mod render;
pub mod session;
pub mod store;
pub mod threshold;
