use thiserror::Error;

/// Errors produced by the channel store and its durable log.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or appending the durable log failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A previous writer panicked while holding the store lock.
    #[error("Store lock poisoned")]
    Poisoned,

    /// A persisted chain head is not a digest string.
    #[error("Invalid chain head: {0}")]
    InvalidChainHead(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
