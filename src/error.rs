//! Error taxonomies for the venue core.
//!
//! `AdapterError` is what venue adapters return; the Aggregator recovers from
//! every variant (logs + excludes the venue), it never propagates as fatal.
//! `AppError` is the service-boundary error surfaced to callers of Store,
//! CredentialVault, and the higher-level engines.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("authentication failed")]
    AuthError,

    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("not supported by this venue")]
    NotSupported,

    #[error("venue error [{code}]: {msg}")]
    VenueError { code: String, msg: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("credential cooldown active until {0}")]
    CooldownError(chrono::DateTime<chrono::Utc>),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

pub type AppResult<T> = Result<T, AppError>;
