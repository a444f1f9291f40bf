//! # DawnAgent Core
//!
//! Domain types, traits, and error definitions for the DawnAgent runtime.
//! This crate does no I/O of its own: it defines the text
//! protocol between host and model and the boundary to the generation
//! capability, which every other crate implements or consumes.
//!
//! ## Design Philosophy
//!
//! The generation engine is opaque. It is reached only through the
//! [`Provider`] trait, so the session controller can be driven by an
//! on-device model, a remote endpoint, or a scripted mock in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod response;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result};
pub use message::{Message, Role};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use response::{AgentResponse, EmotionLine};
pub use token::estimate_tokens;
