//! Generation providers for DawnAgent.
//!
//! All providers implement `dawnagent_core::Provider`. The router picks one
//! from configuration.

#[cfg(feature = "local")]
pub mod local;
pub mod openai_compat;
pub mod router;

#[cfg(feature = "local")]
pub use local::LocalProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
