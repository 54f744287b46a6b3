//! # Core Configuration Module
//!
//! Configuration for the catalog mirror.
//!
//! ## Overview
//!
//! A `CoreConfig` is assembled with [`CoreConfigBuilder`] and validated before
//! anything touches the database or the remote catalog. Every knob has a
//! default that matches the remote API's conventions: 4 hour freshness for all
//! entity kinds, 50-item pages, 4 retries with `1 + 2*attempt` second backoff.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/mirror/catalog.db")
//!     .track_ttl(Duration::from_secs(60 * 60))
//!     .max_concurrent_fetches(8)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.page_size, 50);
//! ```
//!
//! ## Error Handling
//!
//! `build()` fails with [`Error::Config`] and an actionable message:
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! CoreConfig::builder()
//!     .build()
//!     .expect("missing database location");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default freshness window for every entity kind.
pub const DEFAULT_ENTITY_TTL: Duration = Duration::from_secs(60 * 60 * 4);

/// Page size the remote catalog accepts for collection listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

const MAX_PAGE_SIZE: u32 = 50;

/// Where the local mirror lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// Process-local database, lost on exit
    InMemory,
}

/// Per-kind freshness windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTtl {
    pub artist: Duration,
    pub track: Duration,
    pub album: Duration,
    pub playlist: Duration,
    pub user: Duration,
}

impl EntityTtl {
    /// Same window for every kind.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            artist: ttl,
            track: ttl,
            album: ttl,
            playlist: ttl,
            user: ttl,
        }
    }

    fn all(&self) -> [(&'static str, Duration); 5] {
        [
            ("artist", self.artist),
            ("track", self.track),
            ("album", self.album),
            ("playlist", self.playlist),
            ("user", self.user),
        ]
    }
}

impl Default for EntityTtl {
    fn default() -> Self {
        Self::uniform(DEFAULT_ENTITY_TTL)
    }
}

/// Retry schedule for transient remote failures.
///
/// The delay before retry `n` (0-based) is `base_delay + step * n`, so the
/// default waits 1s, 3s, 5s and 7s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub step: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, step: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            step,
        }
    }

    /// Retries without waiting. Used by tests and replay hosts.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self::immediate(0)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay + self.step.saturating_mul(attempt)
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(1), Duration::from_secs(2))
    }
}

/// Configuration for the catalog mirror.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database: DatabaseLocation,
    pub entity_ttl: EntityTtl,
    /// Items requested per collection page
    pub page_size: u32,
    /// Stop paging once this many items were collected
    pub max_collection_items: Option<usize>,
    /// Remote fetches allowed in flight at once
    pub max_concurrent_fetches: usize,
    /// Entities of one batch processed concurrently
    pub batch_concurrency: usize,
    pub retry_policy: RetryPolicy,
    pub event_buffer_size: usize,
    pub logging: LoggingConfig,
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Checks value ranges. Called by [`CoreConfigBuilder::build`].
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        for (kind, ttl) in self.entity_ttl.all() {
            if ttl.is_zero() {
                return Err(Error::Config(format!(
                    "TTL for {} must be greater than zero",
                    kind
                )));
            }
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.max_collection_items == Some(0) {
            return Err(Error::Config(
                "Collection item cap must be greater than zero when set".to_string(),
            ));
        }

        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config(
                "At least one concurrent fetch must be allowed".to_string(),
            ));
        }

        if self.batch_concurrency == 0 {
            return Err(Error::Config(
                "Batch concurrency must be greater than zero".to_string(),
            ));
        }

        if self.retry_policy.max_retries > 10 {
            return Err(Error::Config(
                "Retry count exceeds maximum of 10".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Debug, Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    entity_ttl: EntityTtl,
    page_size: Option<u32>,
    max_collection_items: Option<usize>,
    max_concurrent_fetches: Option<usize>,
    batch_concurrency: Option<usize>,
    retry_policy: Option<RetryPolicy>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the SQLite database file.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Keeps the mirror in memory only.
    pub fn in_memory(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    /// Sets the same TTL for every entity kind.
    pub fn entity_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl = EntityTtl::uniform(ttl);
        self
    }

    pub fn artist_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl.artist = ttl;
        self
    }

    pub fn track_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl.track = ttl;
        self
    }

    pub fn album_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl.album = ttl;
        self
    }

    pub fn playlist_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl.playlist = ttl;
        self
    }

    pub fn user_ttl(mut self, ttl: Duration) -> Self {
        self.entity_ttl.user = ttl;
        self
    }

    /// Items per remote page. Default: 50, the remote maximum.
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Caps how many items a collection listing collects.
    pub fn max_collection_items(mut self, cap: usize) -> Self {
        self.max_collection_items = Some(cap);
        self
    }

    /// Default: 4
    pub fn max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = Some(limit);
        self
    }

    /// Default: 8
    pub fn batch_concurrency(mut self, limit: usize) -> Self {
        self.batch_concurrency = Some(limit);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<CoreConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory() to set it."
                    .to_string(),
            )
        })?;

        let config = CoreConfig {
            database,
            entity_ttl: self.entity_ttl,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_collection_items: self.max_collection_items,
            max_concurrent_fetches: self.max_concurrent_fetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            batch_concurrency: self.batch_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY),
            retry_policy: self.retry_policy.unwrap_or_default(),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::builder().in_memory().build().unwrap();

        assert_eq!(config.database, DatabaseLocation::InMemory);
        assert_eq!(config.entity_ttl, EntityTtl::uniform(DEFAULT_ENTITY_TTL));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_collection_items, None);
        assert_eq!(config.retry_policy.max_retries, 4);
        assert_eq!(config.max_concurrent_fetches, 4);
    }

    #[test]
    fn test_builder_requires_database_location() {
        let err = CoreConfig::builder().build().unwrap_err();
        assert!(err.to_string().contains("Database location is required"));
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let err = CoreConfig::builder().database_path("").build().unwrap_err();
        assert!(err.to_string().contains("Database path cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let err = CoreConfig::builder()
            .in_memory()
            .album_ttl(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("TTL for album"));
    }

    #[test]
    fn test_validate_rejects_page_size_out_of_range() {
        assert!(CoreConfig::builder().in_memory().page_size(0).build().is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .page_size(51)
            .build()
            .is_err());
        assert!(CoreConfig::builder().in_memory().page_size(20).build().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        assert!(CoreConfig::builder()
            .in_memory()
            .max_concurrent_fetches(0)
            .build()
            .is_err());
        assert!(CoreConfig::builder()
            .in_memory()
            .batch_concurrency(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_per_kind_ttl_overrides() {
        let config = CoreConfig::builder()
            .in_memory()
            .entity_ttl(Duration::from_secs(600))
            .user_ttl(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.entity_ttl.track, Duration::from_secs(600));
        assert_eq!(config.entity_ttl.user, Duration::from_secs(60));
    }

    #[test]
    fn test_retry_policy_backoff_schedule() {
        let policy = RetryPolicy::default();

        let delays: Vec<u64> = (0..policy.max_retries)
            .map(|attempt| policy.delay_for(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 3, 5, 7]);
        assert_eq!(policy.max_attempts(), 5);
    }

    #[test]
    fn test_immediate_policy_never_waits() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.delay_for(2), Duration::ZERO);
        assert_eq!(RetryPolicy::disabled().max_attempts(), 1);
    }
}
