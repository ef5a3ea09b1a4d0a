use thiserror::Error;

use nexstream_store::StoreError;

/// Errors surfaced by the client engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A navigation or form payload was structurally invalid. The previous
    /// view is retained.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A write or counter increment was rejected by the store.
    #[error("Write failed: {0}")]
    Write(#[from] StoreError),

    /// The action requires an authenticated identity.
    #[error("Sign-in required")]
    IdentityRequired,

    /// The engine task has shut down.
    #[error("Engine closed")]
    Closed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
