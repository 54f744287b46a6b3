use core_library::{EntityId, EntityKind, LibraryError};
use thiserror::Error;

/// Errors surfaced by the sync layer.
///
/// `Clone` so a single in-flight refresh can hand its outcome to every caller
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Cannot merge {kind} {left} with {right}: ids differ")]
    IdentityMismatch {
        kind: EntityKind,
        left: EntityId,
        right: EntityId,
    },

    #[error("Cannot merge a {left} with a {right}")]
    TypeMismatch { left: EntityKind, right: EntityKind },

    #[error("{kind} {id} does not exist in the remote catalog")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("Fetching {target} failed after {attempts} attempt(s): {message}")]
    FetchFailed {
        target: String,
        attempts: u32,
        message: String,
    },

    #[error("Remote catalog rejected credentials while fetching {target}: {message}")]
    Unauthorized { target: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LibraryError> for SyncError {
    fn from(error: LibraryError) -> Self {
        match error {
            LibraryError::InvalidEntity(message) => SyncError::InvalidEntity(message),
            LibraryError::IdentityMismatch { kind, left, right } => {
                SyncError::IdentityMismatch { kind, left, right }
            }
            LibraryError::TypeMismatch { left, right } => SyncError::TypeMismatch { left, right },
            other => SyncError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
