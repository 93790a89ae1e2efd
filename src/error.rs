//! Service-layer error taxonomy.

use thiserror::Error;

use crate::api::BackendError;
use crate::session::{GuardError, StoreError};

/// Errors surfaced by the client's service layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote scoring service failed or rejected a request.
    #[error("scoring backend error")]
    Backend(#[from] BackendError),
    /// The device-local blob store failed a write.
    #[error("local store error")]
    Store(#[from] StoreError),
    /// A bale invariant blocked the operation.
    #[error(transparent)]
    Guard(#[from] GuardError),
    /// Network sync is switched off in configuration.
    #[error("sync is disabled")]
    SyncDisabled,
    /// An archer has no server-side registration yet, so their scores cannot
    /// be addressed.
    #[error("archer {name} is not registered on the server")]
    NotRegistered {
        /// Display name of the affected archer.
        name: String,
    },
    /// The session is missing a prerequisite for the operation.
    #[error("invalid session state: {0}")]
    InvalidState(String),
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
