//! Remote catalog seam.
//!
//! The HTTP client lives outside this crate. It hands over typed entities and
//! says explicitly whether a miss is "no such entity" or a failure, and whether
//! a failure is worth retrying.

use async_trait::async_trait;
use core_library::{CollectionKind, Entity, EntityId, EntityKind, PageRequest};
use std::time::Duration;
use thiserror::Error;

/// Successful answer from the remote catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Entity),
    NotFound,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Timeout | SourceError::RateLimited { .. } | SourceError::Transient(_)
        )
    }
}

/// One page of a user collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourcePage {
    pub items: Vec<Entity>,
    pub has_more: bool,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Authoritative snapshot of one entity.
    async fn fetch(&self, kind: EntityKind, id: &EntityId) -> Result<FetchOutcome, SourceError>;

    /// One page of a user's favorites or followed playlists.
    async fn fetch_page(
        &self,
        collection: CollectionKind,
        user_id: &EntityId,
        page: PageRequest,
    ) -> Result<SourcePage, SourceError>;
}
