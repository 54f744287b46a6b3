use crate::models::{EntityId, EntityKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
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

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
