//! Error types for the docchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all docchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Index errors ---
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by the embedding and generation collaborators.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider was never configured or is not ready to serve requests.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Failures while (re)building the vector index.
///
/// The index keeps its previous snapshot whenever one of these is returned.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding batch returned {got} vectors for {expected} inputs")]
    BatchMismatch { expected: usize, got: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Record encoding failed: {0}")]
    Encoding(String),
}
