//! Core service façade and bootstrap helpers.
//!
//! Wires a validated [`CoreConfig`], the SQLite mirror, a clock, the event bus
//! and a host-provided [`CatalogSource`] into one ready [`MirrorSession`].
//! The remote client is passed in explicitly; nothing here holds global state
//! besides the optional tracing subscriber installed by [`init_logging`].
//!
//! ```no_run
//! # async fn example(source: std::sync::Arc<dyn core_sync::CatalogSource>) -> core_service::Result<()> {
//! use core_library::{EntityId, EntityKind};
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder().database_path("mirror.db").build()?;
//! core_service::init_logging(&config)?;
//!
//! let core = CoreService::bootstrap(config, source).await?;
//! let report = core.reconcile_favorites(&EntityId::new("user-1")?).await?;
//! println!("{} new favorites", report.added.len());
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::{Clock, SystemClock};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{CatalogStore, Entity, EntityId, EntityKind, SqliteCatalogStore};
use core_runtime::config::{CoreConfig, DatabaseLocation};
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use core_sync::{
    CatalogSource, FavoritesReport, MirrorSession, PlaylistsReport, SessionConfig, SweepReport,
};
use std::sync::Arc;
use tracing::info;

/// Installs the global tracing subscriber described by `config.logging`.
pub fn init_logging(config: &CoreConfig) -> Result<()> {
    core_runtime::logging::init_logging(config.logging.clone())?;
    Ok(())
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    events: EventBus,
    session: MirrorSession,
}

impl CoreService {
    /// Opens (or creates) the mirror database and builds the session on the
    /// system clock.
    pub async fn bootstrap(config: CoreConfig, source: Arc<dyn CatalogSource>) -> Result<Self> {
        Self::bootstrap_with_clock(config, source, Arc::new(SystemClock)).await
    }

    pub async fn bootstrap_with_clock(
        config: CoreConfig,
        source: Arc<dyn CatalogSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let database = match &config.database {
            DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(database)
            .await
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(pool));

        let events = EventBus::new(config.event_buffer_size);
        let session = MirrorSession::new(source, store, clock, SessionConfig::from_core(&config))
            .with_events(events.clone());

        info!(
            database = ?config.database,
            page_size = config.page_size,
            max_concurrent_fetches = config.max_concurrent_fetches,
            "Catalog mirror ready"
        );

        Ok(Self {
            config: Arc::new(config),
            events,
            session,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn session(&self) -> &MirrorSession {
        &self.session
    }

    /// Receiver for every event published after this call.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub async fn ensure_cached(&self, kind: EntityKind, id: &EntityId) -> Result<Entity> {
        Ok(self.session.ensure_cached(kind, id).await?)
    }

    pub async fn reconcile_favorites(&self, user_id: &EntityId) -> Result<FavoritesReport> {
        Ok(self.session.reconcile_favorites(user_id).await?)
    }

    pub async fn reconcile_playlists(&self, user_id: &EntityId) -> Result<PlaylistsReport> {
        Ok(self.session.reconcile_playlists(user_id).await?)
    }

    /// Background consistency pass over up to `limit` rows of `kind`.
    pub async fn refresh_stale(&self, kind: EntityKind, limit: u32) -> Result<SweepReport> {
        Ok(self.session.refresh_stale(kind, limit).await?)
    }
}
