//! Error types for the DawnAgent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Session lifecycle failures are top-level variants; the provider and
//! memory contexts carry their own error enums.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all DawnAgent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session lifecycle ---
    #[error("Generation model is not available on this device")]
    ModelUnavailable,

    #[error("Session is not active: call start() before sending messages")]
    SessionNotStarted,

    #[error("Session has already been started")]
    SessionAlreadyStarted,

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory document at {path} could not be read: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Memory document at {path} could not be written: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
}
