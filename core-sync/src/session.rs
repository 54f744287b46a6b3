//! # Mirror Session
//!
//! Decides, per entity, whether the local record can be used as-is or has to
//! be fetched again, and drives the favorites and followed-playlists passes
//! on top of that decision.
//!
//! ## Entity lifecycle
//!
//! ```text
//! UNKNOWN -> FRESH -> STALE -> (REFRESHING) -> FRESH | FAILED
//! ```
//!
//! - No local record: fetch. Found is stored, `NotFound` writes nothing.
//! - Local record within its window: returned without a remote call.
//! - Local record past its window, or contradicted by a summary the caller
//!   just observed in a listing: fetch, merge into the local record, store.
//! - Fetch still failing after retries: the stale record is served as
//!   [`CacheState::Degraded`] and the failure is logged and published.
//!
//! ## Concurrency
//!
//! At most one refresh per `(kind, id)` runs at a time. Concurrent callers
//! wait for it and receive a clone of its outcome. The refresh itself runs
//! on its own task: the caller's token can abort the remote fetch, but once
//! the fetch has answered the merge and the store write always complete.
//! Remote calls are bounded by a semaphore shared by the whole session.

use crate::diff::{diff, Delta, Keyed};
use crate::error::{Result, SyncError};
use crate::report::{FavoritesReport, PlaylistsReport, SweepReport};
use crate::retry::{retry_transient, FetchFailure};
use crate::singleflight::{Flight, SingleFlight};
use crate::source::{CatalogSource, FetchOutcome, SourceError, SourcePage};
use bridge_traits::Clock;
use core_async::sync::{CancellationToken, Semaphore, SemaphorePermit};
use core_library::{
    CatalogEntity, CatalogStore, CollectionKind, Entity, EntityId, EntityKind, PageRequest,
    Playlist, Track,
};
use core_runtime::config::{
    CoreConfig, EntityTtl, RetryPolicy, DEFAULT_BATCH_CONCURRENCY,
    DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_PAGE_SIZE,
};
use core_runtime::events::{CoreEvent, EntityEvent, EventBus, ReconcileEvent};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tuning for a [`MirrorSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub entity_ttl: EntityTtl,
    pub page_size: u32,
    pub max_collection_items: Option<usize>,
    pub max_concurrent_fetches: usize,
    pub batch_concurrency: usize,
    pub retry_policy: RetryPolicy,
}

impl SessionConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            entity_ttl: config.entity_ttl,
            page_size: config.page_size,
            max_collection_items: config.max_collection_items,
            max_concurrent_fetches: config.max_concurrent_fetches,
            batch_concurrency: config.batch_concurrency,
            retry_policy: config.retry_policy,
        }
    }

    pub fn ttl_for(&self, kind: EntityKind) -> Duration {
        match kind {
            EntityKind::Artist => self.entity_ttl.artist,
            EntityKind::Track => self.entity_ttl.track,
            EntityKind::Album => self.entity_ttl.album,
            EntityKind::Playlist => self.entity_ttl.playlist,
            EntityKind::User => self.entity_ttl.user,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entity_ttl: EntityTtl::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_collection_items: None,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Where an entity ended up after being touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// The local record was within its window; no remote call was made
    Fresh,
    /// There was no local record; the remote copy was stored
    Created,
    /// The local record was merged with the remote copy and stored
    Refreshed,
    /// The remote fetch kept failing; the stale local record is served
    Degraded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entity: Entity,
    pub state: CacheState,
    /// The failure behind a [`CacheState::Degraded`] resolution
    pub refresh_error: Option<SyncError>,
}

impl Resolution {
    fn new(entity: Entity, state: CacheState) -> Self {
        Self {
            entity,
            state,
            refresh_error: None,
        }
    }
}

/// What made the caller touch an entity.
#[derive(Debug, Clone)]
enum Trigger {
    /// Refresh when missing or past its window
    Touch,
    /// As `Touch`, and also when this listing summary disagrees with the local record
    Observed(Entity),
    /// Refresh unconditionally
    Sweep,
}

impl Trigger {
    /// Whether a refresh started by another caller also answers this one.
    fn is_answered_by(&self, resolution: &Resolution) -> Result<bool> {
        Ok(match self {
            Trigger::Touch => true,
            Trigger::Observed(observed) => !resolution.entity.is_contradicted_by(observed)?,
            Trigger::Sweep => resolution.state != CacheState::Fresh,
        })
    }
}

type FlightKey = (EntityKind, EntityId);

/// Orchestrates the local mirror against the remote catalog.
///
/// Cheap to clone; clones share the fetch limiter, the in-flight refreshes
/// and the event bus.
#[derive(Clone)]
pub struct MirrorSession {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    fetch_permits: Arc<Semaphore>,
    flights: SingleFlight<FlightKey, Result<Resolution>>,
    events: Option<EventBus>,
}

impl MirrorSession {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn CatalogStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let fetch_permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));
        Self {
            source,
            store,
            clock,
            config,
            fetch_permits,
            flights: SingleFlight::new(),
            events: None,
        }
    }

    /// Publishes cache and reconciliation events on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    // =========================================================================
    // Single entities
    // =========================================================================

    /// The entity, fetched or refreshed first when the local record cannot be
    /// trusted.
    pub async fn ensure_cached(&self, kind: EntityKind, id: &EntityId) -> Result<Entity> {
        self.ensure_cached_with(kind, id, &CancellationToken::new())
            .await
    }

    pub async fn ensure_cached_with(
        &self,
        kind: EntityKind,
        id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Entity> {
        self.resolve_with(kind, id, cancel)
            .await
            .map(|resolution| resolution.entity)
    }

    /// Like [`ensure_cached`](Self::ensure_cached), also reporting which
    /// state the entity was resolved from.
    pub async fn resolve(&self, kind: EntityKind, id: &EntityId) -> Result<Resolution> {
        self.resolve_with(kind, id, &CancellationToken::new()).await
    }

    pub async fn resolve_with(
        &self,
        kind: EntityKind,
        id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        self.gate(kind, id, Trigger::Touch, cancel).await
    }

    /// Touches the entity behind a summary seen in a remote listing. A fresh
    /// local record is refetched anyway when the summary contradicts it.
    pub async fn ensure_observed(&self, observed: &Entity) -> Result<Resolution> {
        self.ensure_observed_with(observed, &CancellationToken::new())
            .await
    }

    pub async fn ensure_observed_with(
        &self,
        observed: &Entity,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        self.gate(
            observed.kind(),
            observed.id(),
            Trigger::Observed(observed.clone()),
            cancel,
        )
        .await
    }

    /// A track plus the artists and album it references.
    ///
    /// Only the track itself is required; related entities that cannot be
    /// cached are logged and skipped.
    pub async fn ensure_track_graph(
        &self,
        id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Track> {
        self.cache_track_graph(id, None, cancel).await
    }

    async fn cache_track_graph(
        &self,
        id: &EntityId,
        observed: Option<Track>,
        cancel: &CancellationToken,
    ) -> Result<Track> {
        let trigger = match observed {
            Some(track) => Trigger::Observed(Entity::Track(track)),
            None => Trigger::Touch,
        };
        let resolution = self.gate(EntityKind::Track, id, trigger, cancel).await?;
        let track = Track::try_from(resolution.entity)?;

        let mut related: Vec<(EntityKind, EntityId)> = track
            .artists
            .iter()
            .map(|artist| (EntityKind::Artist, artist.id().clone()))
            .collect();
        if let Some(album_id) = track.album_id() {
            related.push((EntityKind::Album, album_id.clone()));
        }

        let failures: Vec<(EntityKind, EntityId, SyncError)> = stream::iter(related)
            .map(|(kind, related_id)| async move {
                let outcome = self.gate(kind, &related_id, Trigger::Touch, cancel).await;
                (kind, related_id, outcome)
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .filter_map(|(kind, related_id, outcome)| async move {
                outcome.err().map(|error| (kind, related_id, error))
            })
            .collect()
            .await;

        for (kind, related_id, error) in failures {
            if error == SyncError::Cancelled {
                return Err(error);
            }
            warn!(
                track = %track.id(),
                kind = %kind,
                id = %related_id,
                error = %error,
                "Could not cache entity referenced by track"
            );
        }

        Ok(track)
    }

    /// Joins or starts the single refresh for `(kind, id)` and waits for it.
    async fn gate(
        &self,
        kind: EntityKind,
        id: &EntityId,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let key = (kind, id.clone());
        let mut rejoined = false;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let (follower, led) = match self.flights.join(key.clone()) {
                Flight::Leader(leader) => {
                    let follower = leader.subscribe().ok_or_else(|| {
                        SyncError::Internal(format!("refresh of {} {} closed early", kind, id))
                    })?;
                    let session = self.clone();
                    let id = id.clone();
                    let trigger = trigger.clone();
                    let token = cancel.child_token();
                    core_async::spawn(async move {
                        let outcome = session.refresh(kind, &id, trigger, &token).await;
                        leader.publish(outcome);
                    });
                    (follower, true)
                }
                Flight::Follower(follower) => {
                    debug!(kind = %kind, id = %id, "Joining in-flight refresh");
                    (follower, false)
                }
            };

            let outcome = core_async::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                outcome = follower.wait() => outcome,
            };

            let outcome = outcome.ok_or_else(|| {
                SyncError::Internal(format!("refresh of {} {} ended without a result", kind, id))
            })?;

            match outcome {
                // The caller that started this flight gave up; start over.
                Err(SyncError::Cancelled) => continue,
                Ok(resolution) if !led && !rejoined && !trigger.is_answered_by(&resolution)? => {
                    debug!(kind = %kind, id = %id, "Joined refresh left this request open");
                    rejoined = true;
                }
                outcome => return outcome,
            }
        }
    }

    #[instrument(skip(self, trigger, cancel), fields(kind = %kind, id = %id))]
    async fn refresh(
        &self,
        kind: EntityKind,
        id: &EntityId,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let now = self.clock.unix_timestamp();
        let ttl = self.config.ttl_for(kind);
        let local = self.store.get(kind, id).await?.map(|mut entity| {
            entity.set_expires_after(ttl);
            entity
        });

        let forced = matches!(trigger, Trigger::Sweep);
        let observed = match trigger {
            Trigger::Observed(observed) => Some(observed),
            Trigger::Touch | Trigger::Sweep => None,
        };

        if let Some(local) = &local {
            let stale = local.is_stale(now);
            let contradicted = match &observed {
                Some(observed) => local.is_contradicted_by(observed)?,
                None => false,
            };
            if !forced && !stale && !contradicted {
                debug!("Local record is fresh");
                return Ok(Resolution::new(local.clone(), CacheState::Fresh));
            }
            debug!(stale, contradicted, forced, "Refreshing local record");
        }

        let target = format!("{}:{}", kind, id);
        let fetched = core_async::select! {
            _ = cancel.cancelled() => {
                debug!("Refresh cancelled before the remote answered");
                return Err(SyncError::Cancelled);
            }
            fetched = self.fetch_entity(kind, id, &target) => fetched,
        };

        match fetched {
            Ok(FetchOutcome::Found(remote)) => {
                self.persist(kind, id, local, remote, observed, now).await
            }
            Ok(FetchOutcome::NotFound) => {
                info!("Remote catalog has no such entity");
                Err(SyncError::NotFound {
                    kind,
                    id: id.clone(),
                })
            }
            Err(failure) => self.settle_failure(kind, id, local, failure, target),
        }
    }

    async fn persist(
        &self,
        kind: EntityKind,
        id: &EntityId,
        local: Option<Entity>,
        mut remote: Entity,
        observed: Option<Entity>,
        now: i64,
    ) -> Result<Resolution> {
        if remote.kind() != kind {
            return Err(SyncError::TypeMismatch {
                left: kind,
                right: remote.kind(),
            });
        }
        if remote.id() != id {
            return Err(SyncError::IdentityMismatch {
                kind,
                left: id.clone(),
                right: remote.id().clone(),
            });
        }
        // Stamped at fetch time so the copy re-enters its freshness window.
        remote.set_timestamp(remote.timestamp().max(now));
        remote.set_expires_after(self.config.ttl_for(kind));

        // The fetched copy wins ties with the local record.
        let mut merged = match &local {
            Some(local) => remote.merge(local)?,
            None => remote,
        };
        if let Some(mut observed) = observed {
            // Ties go to the receiver, so the summary only fills gaps.
            observed.set_timestamp(merged.timestamp());
            merged = merged.merge(&observed)?;
        }

        self.store.upsert(&merged).await?;

        let state = if local.is_some() {
            CacheState::Refreshed
        } else {
            CacheState::Created
        };
        debug!(state = ?state, timestamp = merged.timestamp(), "Entity cached");
        self.emit(CoreEvent::Entity(EntityEvent::Cached {
            kind: kind.to_string(),
            id: id.to_string(),
            merged: local.is_some(),
        }));

        Ok(Resolution::new(merged, state))
    }

    fn settle_failure(
        &self,
        kind: EntityKind,
        id: &EntityId,
        local: Option<Entity>,
        failure: FetchFailure,
        target: String,
    ) -> Result<Resolution> {
        let exhausted = failure.exhausted();
        let error = failure.into_sync_error(target);
        let degraded = exhausted && local.is_some();

        self.emit(CoreEvent::Entity(EntityEvent::RefreshFailed {
            kind: kind.to_string(),
            id: id.to_string(),
            message: error.to_string(),
            degraded,
        }));

        match local {
            Some(entity) if exhausted => {
                warn!(error = %error, "Remote unavailable, serving stale local record");
                Ok(Resolution {
                    entity,
                    state: CacheState::Degraded,
                    refresh_error: Some(error),
                })
            }
            _ => {
                warn!(error = %error, "Refresh failed");
                Err(error)
            }
        }
    }

    async fn fetch_entity(
        &self,
        kind: EntityKind,
        id: &EntityId,
        target: &str,
    ) -> std::result::Result<FetchOutcome, FetchFailure> {
        retry_transient(&self.config.retry_policy, target, |_| async move {
            let _permit = self.fetch_permit().await?;
            self.source.fetch(kind, id).await
        })
        .await
    }

    async fn fetch_permit(&self) -> std::result::Result<SemaphorePermit<'_>, SourceError> {
        self.fetch_permits
            .acquire()
            .await
            .map_err(|_| SourceError::Permanent("fetch limiter closed".to_string()))
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Every member of a user's remote collection, in remote order.
    ///
    /// Pages until the remote reports no more items, a page comes back short,
    /// or `max_collection_items` is reached. Items of the wrong kind are
    /// dropped.
    pub async fn fetch_collection(
        &self,
        collection: CollectionKind,
        user_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entity>> {
        let member_kind = collection.member_kind();
        let mut items = Vec::new();
        let mut page = PageRequest::new(0, self.config.page_size);

        loop {
            let target = format!("{} of {} (page {})", collection, user_id, page.page);
            let fetched = core_async::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                fetched = retry_transient(&self.config.retry_policy, &target, |_| async move {
                    let _permit = self.fetch_permit().await?;
                    self.source.fetch_page(collection, user_id, page).await
                }) => fetched,
            };
            let SourcePage {
                items: batch,
                has_more,
            } = fetched.map_err(|failure| failure.into_sync_error(target))?;

            let short_page = batch.len() < page.limit() as usize;
            debug!(
                collection = %collection,
                page = page.page,
                items = batch.len(),
                has_more,
                "Fetched collection page"
            );

            for item in batch {
                if item.kind() == member_kind {
                    items.push(item);
                } else {
                    warn!(
                        collection = %collection,
                        kind = %item.kind(),
                        id = %item.id(),
                        "Dropping listed item of unexpected kind"
                    );
                }
            }

            if let Some(cap) = self.config.max_collection_items {
                if items.len() >= cap {
                    items.truncate(cap);
                    break;
                }
            }
            if !has_more || short_page {
                break;
            }
            page = page.next();
        }

        Ok(items)
    }

    /// Favorites present remotely but not locally, and the reverse.
    pub async fn diff_favorites(
        &self,
        user_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Delta<EntityId, Track>> {
        let (local, remote) = self.favorites_listings(user_id, cancel).await?;
        Ok(diff(&local, &remote))
    }

    /// Applies a favorites delta: caches each added track with its artists
    /// and album, links the ones that succeeded, and unlinks the removed ones.
    /// Track rows are never deleted.
    pub async fn commit_favorites(
        &self,
        user_id: &EntityId,
        delta: &Delta<EntityId, Track>,
        cancel: &CancellationToken,
    ) -> Result<FavoritesReport> {
        let outcomes: Vec<(EntityId, Result<Track>)> = stream::iter(delta.added.iter().cloned())
            .map(|track| async move {
                let id = track.id().clone();
                let outcome = self.cache_track_graph(&id, Some(track), cancel).await;
                (id, outcome)
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let mut report = FavoritesReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(track) => report.added.push(track),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(error) => {
                    warn!(user = %user_id, track = %id, error = %error, "Favorite left unlinked");
                    report.failed.push((id, error));
                }
            }
        }

        let linked: Vec<EntityId> = report
            .added
            .iter()
            .map(|track| track.id().clone())
            .collect();
        if !linked.is_empty() {
            self.store
                .add_membership(
                    CollectionKind::Favorites,
                    user_id,
                    &linked,
                    self.clock.unix_timestamp(),
                )
                .await?;
        }

        if !delta.removed.is_empty() {
            self.store
                .remove_membership(CollectionKind::Favorites, user_id, &delta.removed)
                .await?;
            for id in &delta.removed {
                let track = match self.store.get(EntityKind::Track, id).await? {
                    Some(Entity::Track(track)) => track,
                    _ => Track::stub(id.clone(), 0),
                };
                report.removed.push(track);
            }
        }

        Ok(report)
    }

    pub async fn reconcile_favorites(&self, user_id: &EntityId) -> Result<FavoritesReport> {
        self.reconcile_favorites_with(user_id, &CancellationToken::new())
            .await
    }

    /// Brings the user's local favorites in line with the remote listing.
    ///
    /// Added tracks are cached before they are linked; favorites kept on both
    /// sides are checked against their listing summary and refreshed when it
    /// disagrees or they are past their window.
    #[instrument(skip(self, cancel), fields(user = %user_id))]
    pub async fn reconcile_favorites_with(
        &self,
        user_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<FavoritesReport> {
        let (local, remote) = self.favorites_listings(user_id, cancel).await?;
        let delta = diff(&local, &remote);
        info!(
            local = local.len(),
            remote = remote.len(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            "Favorites diffed"
        );

        let report = self.commit_favorites(user_id, &delta, cancel).await?;

        let added: HashSet<&EntityId> = delta.added.iter().map(Keyed::key).collect();
        let retained: Vec<Entity> = remote
            .iter()
            .filter(|track| !added.contains(track.key()))
            .cloned()
            .map(Entity::from)
            .collect();
        for (id, error) in self.observe_all(retained, cancel).await? {
            warn!(track = %id, error = %error, "Could not refresh favorite");
        }

        self.emit(CoreEvent::Reconcile(ReconcileEvent::FavoritesReconciled {
            user_id: user_id.to_string(),
            added: report.added.len() as u64,
            removed: report.removed.len() as u64,
            failed: report.failed.len() as u64,
        }));
        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Favorites reconciled"
        );

        Ok(report)
    }

    async fn favorites_listings(
        &self,
        user_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<(Vec<EntityId>, Vec<Track>)> {
        let local = self
            .store
            .list_membership(CollectionKind::Favorites, user_id)
            .await?;
        let remote = self
            .fetch_collection(CollectionKind::Favorites, user_id, cancel)
            .await?
            .into_iter()
            .filter_map(|entity| Track::try_from(entity).ok())
            .collect();
        Ok((local, remote))
    }

    pub async fn reconcile_playlists(&self, user_id: &EntityId) -> Result<PlaylistsReport> {
        self.reconcile_playlists_with(user_id, &CancellationToken::new())
            .await
    }

    /// Brings the user's followed playlists in line with the remote listing.
    ///
    /// Only playlists the user owns are kept. Each one is refreshed when its
    /// summary disagrees with the local record or it is past its window, and
    /// its tracks are cached.
    #[instrument(skip(self, cancel), fields(user = %user_id))]
    pub async fn reconcile_playlists_with(
        &self,
        user_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<PlaylistsReport> {
        let mut seen = HashSet::new();
        let remote: Vec<Playlist> = self
            .fetch_collection(CollectionKind::FollowedPlaylists, user_id, cancel)
            .await?
            .into_iter()
            .filter_map(|entity| Playlist::try_from(entity).ok())
            .filter(|playlist| playlist.owner_id.as_ref() == Some(user_id))
            .filter(|playlist| seen.insert(playlist.id().clone()))
            .map(|mut playlist| {
                playlist.following_user_id = Some(user_id.clone());
                playlist
            })
            .collect();

        let local = self
            .store
            .list_membership(CollectionKind::FollowedPlaylists, user_id)
            .await?;
        let delta = diff(&local, &remote);
        info!(
            local = local.len(),
            remote = remote.len(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            "Followed playlists diffed"
        );

        let outcomes: Vec<(EntityId, Result<Playlist>)> = stream::iter(remote)
            .map(|playlist| async move {
                let id = playlist.id().clone();
                let outcome = self.cache_playlist(playlist, cancel).await;
                (id, outcome)
            })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let added: HashSet<&EntityId> = delta.added.iter().map(Keyed::key).collect();
        let mut report = PlaylistsReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(playlist) => {
                    if added.contains(&id) {
                        report.added.push(id);
                    }
                    report.playlists.push(playlist);
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(error) => {
                    warn!(playlist = %id, error = %error, "Could not cache followed playlist");
                    report.failed.push((id, error));
                }
            }
        }

        if !report.added.is_empty() {
            self.store
                .add_membership(
                    CollectionKind::FollowedPlaylists,
                    user_id,
                    &report.added,
                    self.clock.unix_timestamp(),
                )
                .await?;
        }
        if !delta.removed.is_empty() {
            self.store
                .remove_membership(CollectionKind::FollowedPlaylists, user_id, &delta.removed)
                .await?;
            report.removed = delta.removed;
        }

        self.emit(CoreEvent::Reconcile(ReconcileEvent::PlaylistsReconciled {
            user_id: user_id.to_string(),
            playlists: report.playlists.len() as u64,
            added: report.added.len() as u64,
            removed: report.removed.len() as u64,
            failed: report.failed.len() as u64,
        }));
        info!(
            playlists = report.playlists.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "Followed playlists reconciled"
        );

        Ok(report)
    }

    async fn cache_playlist(
        &self,
        playlist: Playlist,
        cancel: &CancellationToken,
    ) -> Result<Playlist> {
        let id = playlist.id().clone();
        let resolution = self
            .gate(
                EntityKind::Playlist,
                &id,
                Trigger::Observed(Entity::Playlist(playlist)),
                cancel,
            )
            .await?;
        let playlist = Playlist::try_from(resolution.entity)?;

        if let Some(tracks) = &playlist.tracks {
            let listed = tracks.iter().cloned().map(Entity::from).collect();
            for (track_id, error) in self.observe_all(listed, cancel).await? {
                warn!(playlist = %id, track = %track_id, error = %error, "Could not cache playlist track");
            }
        }

        Ok(playlist)
    }

    /// Touches every observed summary; returns the ones that failed.
    async fn observe_all(
        &self,
        observed: Vec<Entity>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(EntityId, SyncError)>> {
        let failures: Vec<(EntityId, SyncError)> = stream::iter(observed)
            .map(|entity| async move {
                let id = entity.id().clone();
                let outcome = self
                    .gate(entity.kind(), &id, Trigger::Observed(entity), cancel)
                    .await;
                (id, outcome)
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .filter_map(|(id, outcome)| async move { outcome.err().map(|error| (id, error)) })
            .collect()
            .await;

        if failures
            .iter()
            .any(|(_, error)| *error == SyncError::Cancelled)
        {
            return Err(SyncError::Cancelled);
        }
        Ok(failures)
    }

    // =========================================================================
    // Background sweep
    // =========================================================================

    /// Refetches up to `limit` rows of `kind` that are past their window,
    /// were never synced, or lack fields a full fetch supplies.
    ///
    /// Sweeps are not cancellable; every started refresh runs to completion.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn refresh_stale(&self, kind: EntityKind, limit: u32) -> Result<SweepReport> {
        let now = self.clock.unix_timestamp();
        let ttl = i64::try_from(self.config.ttl_for(kind).as_secs()).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(ttl);
        let candidates = self
            .store
            .list_refresh_candidates(kind, cutoff, limit)
            .await?;

        let token = CancellationToken::new();
        let token = &token;
        let outcomes: Vec<(EntityId, Result<Resolution>)> =
            stream::iter(candidates.iter().cloned())
                .map(|id| async move {
                    let outcome = self.gate(kind, &id, Trigger::Sweep, token).await;
                    (id, outcome)
                })
                .buffer_unordered(self.config.batch_concurrency.max(1))
                .collect()
                .await;

        let mut report = SweepReport {
            kind,
            candidates: candidates.len(),
            refreshed: Vec::new(),
            failed: Vec::new(),
        };
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Resolution {
                    refresh_error: Some(error),
                    ..
                })
                | Err(error) => report.failed.push((id, error)),
                Ok(_) => report.refreshed.push(id),
            }
        }

        self.emit(CoreEvent::Reconcile(ReconcileEvent::SweepCompleted {
            kind: kind.to_string(),
            refreshed: report.refreshed.len() as u64,
            failed: report.failed.len() as u64,
        }));
        info!(
            candidates = report.candidates,
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "Sweep completed"
        );

        Ok(report)
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.emit(event);
        }
    }
}
