//! Scenario tests for the mirror session against an in-memory store and a
//! scripted remote catalog.

use async_trait::async_trait;
use bridge_traits::ManualClock;
use core_async::sync::{CancellationToken, Mutex};
use core_async::time::{sleep, Duration};
use core_library::db::create_test_pool;
use core_library::{
    Artist, CatalogStore, CollectionKind, Entity, EntityId, EntityKind, PageRequest, Playlist,
    SqliteCatalogStore, Track,
};
use core_runtime::config::{EntityTtl, RetryPolicy};
use core_runtime::events::{CoreEvent, EntityEvent, EventBus, ReconcileEvent};
use core_sync::{
    CacheState, CatalogSource, FetchOutcome, MirrorSession, SessionConfig, SourceError,
    SourcePage, SyncError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;
const TTL_SECS: u64 = 3_600;

fn id(value: &str) -> EntityId {
    EntityId::new(value).unwrap()
}

// ============================================================================
// Scripted remote catalog
// ============================================================================

#[derive(Default)]
struct FakeSource {
    entities: Mutex<HashMap<(EntityKind, EntityId), Entity>>,
    listings: Mutex<HashMap<(CollectionKind, EntityId), Vec<Entity>>>,
    failures: Mutex<HashMap<EntityId, SourceError>>,
    fetches: AtomicUsize,
    page_fetches: AtomicUsize,
    delay: Duration,
}

impl FakeSource {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    async fn publish(&self, entity: impl Into<Entity>) {
        let entity = entity.into();
        self.entities
            .lock()
            .await
            .insert((entity.kind(), entity.id().clone()), entity);
    }

    async fn list(&self, collection: CollectionKind, user: &str, items: Vec<Entity>) {
        self.listings
            .lock()
            .await
            .insert((collection, id(user)), items);
    }

    async fn fail(&self, entity_id: &str, error: SourceError) {
        self.failures.lock().await.insert(id(entity_id), error);
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn page_count(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    async fn fetch(&self, kind: EntityKind, id: &EntityId) -> Result<FetchOutcome, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if let Some(error) = self.failures.lock().await.get(id) {
            return Err(error.clone());
        }

        let entities = self.entities.lock().await;
        Ok(match entities.get(&(kind, id.clone())) {
            Some(entity) => FetchOutcome::Found(entity.clone()),
            None => FetchOutcome::NotFound,
        })
    }

    async fn fetch_page(
        &self,
        collection: CollectionKind,
        user_id: &EntityId,
        page: PageRequest,
    ) -> Result<SourcePage, SourceError> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);

        let listings = self.listings.lock().await;
        let listing = listings
            .get(&(collection, user_id.clone()))
            .cloned()
            .unwrap_or_default();

        let start = page.offset() as usize;
        let items: Vec<Entity> = listing
            .iter()
            .skip(start)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        let has_more = start + items.len() < listing.len();

        Ok(SourcePage { items, has_more })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Harness {
    session: MirrorSession,
    source: Arc<FakeSource>,
    store: Arc<SqliteCatalogStore>,
    clock: Arc<ManualClock>,
}

fn test_config() -> SessionConfig {
    SessionConfig {
        entity_ttl: EntityTtl::uniform(std::time::Duration::from_secs(TTL_SECS)),
        page_size: 2,
        retry_policy: RetryPolicy::immediate(2),
        ..SessionConfig::default()
    }
}

async fn harness_with(source: FakeSource, config: SessionConfig) -> Harness {
    let pool = create_test_pool().await.unwrap();
    let store = Arc::new(SqliteCatalogStore::new(pool));
    let source = Arc::new(source);
    let clock = Arc::new(ManualClock::new(NOW));

    let session = MirrorSession::new(source.clone(), store.clone(), clock.clone(), config);

    Harness {
        session,
        source,
        store,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(FakeSource::default(), test_config()).await
}

fn full_track(track_id: &str, name: &str) -> Track {
    let mut track = Track::new(track_id, 0).unwrap().with_name(name);
    track.duration_ms = Some(180_000);
    track
}

async fn favorites_of(harness: &Harness, user: &str) -> Vec<EntityId> {
    let mut ids = harness
        .store
        .list_membership(CollectionKind::Favorites, &id(user))
        .await
        .unwrap();
    ids.sort();
    ids
}

async fn stored_track(harness: &Harness, track_id: &str) -> Track {
    match harness
        .store
        .get(EntityKind::Track, &id(track_id))
        .await
        .unwrap()
    {
        Some(Entity::Track(track)) => track,
        other => panic!("expected a cached track, got {:?}", other),
    }
}

// ============================================================================
// Per-entity lifecycle
// ============================================================================

#[core_async::test]
async fn test_unknown_entity_is_fetched_and_stored() -> anyhow::Result<()> {
    let h = harness().await;
    h.source.publish(full_track("t1", "One")).await;

    let resolution = h.session.resolve(EntityKind::Track, &id("t1")).await?;
    assert_eq!(resolution.state, CacheState::Created);
    assert_eq!(resolution.entity.name(), Some("One"));
    assert_eq!(resolution.entity.timestamp(), NOW);

    let stored = h.store.get(EntityKind::Track, &id("t1")).await?.unwrap();
    assert_eq!(stored.name(), Some("One"));
    Ok(())
}

#[core_async::test]
async fn test_fresh_entity_makes_no_remote_call() -> anyhow::Result<()> {
    let h = harness().await;
    h.source.publish(full_track("t1", "One")).await;

    h.session.ensure_cached(EntityKind::Track, &id("t1")).await?;
    h.clock.advance(60);
    let resolution = h.session.resolve(EntityKind::Track, &id("t1")).await?;

    assert_eq!(resolution.state, CacheState::Fresh);
    assert_eq!(h.source.fetch_count(), 1);
    Ok(())
}

#[core_async::test]
async fn test_stale_entity_is_merged_with_remote() -> anyhow::Result<()> {
    let h = harness().await;

    let mut local = Track::new("t1", NOW - 2 * TTL_SECS as i64)
        .unwrap()
        .with_name("Old");
    local.explicit = Some(true);
    h.store.upsert(&Entity::from(local)).await?;
    h.source.publish(full_track("t1", "New")).await;

    let resolution = h.session.resolve(EntityKind::Track, &id("t1")).await?;
    assert_eq!(resolution.state, CacheState::Refreshed);

    let Entity::Track(track) = h.store.get(EntityKind::Track, &id("t1")).await?.unwrap() else {
        panic!("expected a track");
    };
    assert_eq!(track.name.as_deref(), Some("New"));
    // Absent remotely, recovered from the older local copy.
    assert_eq!(track.explicit, Some(true));
    assert_eq!(track.timestamp, NOW);
    Ok(())
}

#[core_async::test]
async fn test_remote_copy_with_old_timestamp_reenters_window() -> anyhow::Result<()> {
    let h = harness().await;

    let mut local = full_track("t1", "Old");
    local.timestamp = NOW - 2 * TTL_SECS as i64;
    h.store.upsert(&Entity::from(local)).await?;

    let mut remote = full_track("t1", "New");
    remote.timestamp = 1_000;
    h.source.publish(remote).await;

    let first = h.session.resolve(EntityKind::Track, &id("t1")).await?;
    assert_eq!(first.state, CacheState::Refreshed);
    assert_eq!(first.entity.name(), Some("New"));
    assert_eq!(first.entity.timestamp(), NOW);

    let second = h.session.resolve(EntityKind::Track, &id("t1")).await?;
    assert_eq!(second.state, CacheState::Fresh);
    assert_eq!(h.source.fetch_count(), 1);
    assert_eq!(stored_track(&h, "t1").await.name.as_deref(), Some("New"));
    Ok(())
}

#[core_async::test]
async fn test_not_found_writes_nothing() {
    let h = harness().await;

    let err = h
        .session
        .ensure_cached(EntityKind::Track, &id("ghost"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SyncError::NotFound {
            kind: EntityKind::Track,
            id: id("ghost"),
        }
    );
    assert!(h
        .store
        .get(EntityKind::Track, &id("ghost"))
        .await
        .unwrap()
        .is_none());
}

#[core_async::test]
async fn test_contradicting_summary_refreshes_fresh_record() -> anyhow::Result<()> {
    let h = harness().await;
    h.source.publish(full_track("t1", "Renamed")).await;

    let mut local = full_track("t1", "Original");
    local.timestamp = NOW;
    h.store.upsert(&Entity::from(local.clone())).await?;

    // Agreeing summary: no fetch.
    let agreeing = Track::new("t1", 0).unwrap().with_name("Original");
    let resolution = h.session.ensure_observed(&Entity::from(agreeing)).await?;
    assert_eq!(resolution.state, CacheState::Fresh);
    assert_eq!(h.source.fetch_count(), 0);

    let disagreeing = Track::new("t1", 0).unwrap().with_name("Renamed");
    let resolution = h
        .session
        .ensure_observed(&Entity::from(disagreeing))
        .await?;
    assert_eq!(resolution.state, CacheState::Refreshed);
    assert_eq!(resolution.entity.name(), Some("Renamed"));
    assert_eq!(h.source.fetch_count(), 1);
    Ok(())
}

// ============================================================================
// Failures
// ============================================================================

#[core_async::test]
async fn test_exhausted_retries_serve_stale_record() -> anyhow::Result<()> {
    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let mut h = harness().await;
    h.session = h.session.clone().with_events(events);

    let mut stale = full_track("t1", "Cached");
    stale.timestamp = NOW - 2 * TTL_SECS as i64;
    h.store.upsert(&Entity::from(stale)).await?;
    h.source.fail("t1", SourceError::Timeout).await;

    let resolution = h.session.resolve(EntityKind::Track, &id("t1")).await?;

    assert_eq!(resolution.state, CacheState::Degraded);
    assert_eq!(resolution.entity.name(), Some("Cached"));
    assert!(matches!(
        resolution.refresh_error,
        Some(SyncError::FetchFailed { attempts: 3, .. })
    ));
    assert_eq!(h.source.fetch_count(), 3);

    match rx.try_recv()? {
        CoreEvent::Entity(EntityEvent::RefreshFailed { id, degraded, .. }) => {
            assert_eq!(id, "t1");
            assert!(degraded);
        }
        other => panic!("unexpected event {:?}", other),
    }
    Ok(())
}

#[core_async::test]
async fn test_exhausted_retries_without_local_record_fail() {
    let h = harness().await;
    h.source
        .fail("t1", SourceError::RateLimited { retry_after: None })
        .await;

    let err = h
        .session
        .ensure_cached(EntityKind::Track, &id("t1"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::FetchFailed { attempts: 3, .. }));
}

#[core_async::test]
async fn test_permanent_failure_is_not_retried() {
    let h = harness().await;
    h.source
        .fail("t1", SourceError::Unauthorized("token expired".to_string()))
        .await;

    let err = h
        .session
        .ensure_cached(EntityKind::Track, &id("t1"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Unauthorized { .. }));
    assert_eq!(h.source.fetch_count(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[core_async::test]
async fn test_concurrent_callers_share_one_fetch() {
    let h = harness_with(
        FakeSource::with_delay(Duration::from_millis(50)),
        test_config(),
    )
    .await;
    h.source.publish(full_track("t1", "One")).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let session = h.session.clone();
        handles.push(core_async::spawn(async move {
            session.ensure_cached(EntityKind::Track, &id("t1")).await
        }));
    }

    for handle in handles {
        let entity = handle.await.unwrap().unwrap();
        assert_eq!(entity.name(), Some("One"));
    }
    assert_eq!(h.source.fetch_count(), 1);
}

#[core_async::test]
async fn test_concurrent_callers_share_one_refresh_of_stale_record() -> anyhow::Result<()> {
    let h = harness_with(
        FakeSource::with_delay(Duration::from_millis(50)),
        test_config(),
    )
    .await;

    let mut stale = full_track("t1", "Old");
    stale.timestamp = NOW - 2 * TTL_SECS as i64;
    stale.explicit = Some(false);
    h.store.upsert(&Entity::from(stale)).await?;
    h.source.publish(full_track("t1", "New")).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let session = h.session.clone();
        handles.push(core_async::spawn(async move {
            session.resolve(EntityKind::Track, &id("t1")).await
        }));
    }

    for handle in handles {
        let resolution = handle.await??;
        assert_eq!(resolution.state, CacheState::Refreshed);
        assert_eq!(resolution.entity.name(), Some("New"));
    }
    assert_eq!(h.source.fetch_count(), 1);

    let stored = stored_track(&h, "t1").await;
    assert_eq!(stored.name.as_deref(), Some("New"));
    assert_eq!(stored.explicit, Some(false));
    assert_eq!(stored.timestamp, NOW);
    Ok(())
}

#[core_async::test]
async fn test_summary_joining_a_refresh_still_fills_gaps() -> anyhow::Result<()> {
    let h = harness_with(
        FakeSource::with_delay(Duration::from_millis(100)),
        test_config(),
    )
    .await;

    let mut stale = full_track("t1", "One");
    stale.timestamp = NOW - 2 * TTL_SECS as i64;
    h.store.upsert(&Entity::from(stale)).await?;
    h.source.publish(full_track("t1", "One")).await;

    let touch = {
        let session = h.session.clone();
        core_async::spawn(async move { session.resolve(EntityKind::Track, &id("t1")).await })
    };
    sleep(Duration::from_millis(10)).await;

    let mut summary = Track::new("t1", 0)?.with_name("One");
    summary.popularity = Some(77);
    let observed = h.session.ensure_observed(&Entity::from(summary)).await?;

    assert_eq!(touch.await??.state, CacheState::Refreshed);
    let Entity::Track(observed) = observed.entity else {
        panic!("expected a track");
    };
    assert_eq!(observed.popularity, Some(77));
    assert_eq!(stored_track(&h, "t1").await.popularity, Some(77));
    assert_eq!(h.source.fetch_count(), 2);
    Ok(())
}

#[core_async::test]
async fn test_cancelled_caller_does_not_write() {
    let h = harness_with(
        FakeSource::with_delay(Duration::from_millis(200)),
        test_config(),
    )
    .await;
    h.source.publish(full_track("t1", "One")).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    core_async::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = h
        .session
        .ensure_cached_with(EntityKind::Track, &id("t1"), &token)
        .await
        .unwrap_err();
    assert_eq!(err, SyncError::Cancelled);

    sleep(Duration::from_millis(50)).await;
    assert!(h
        .store
        .get(EntityKind::Track, &id("t1"))
        .await
        .unwrap()
        .is_none());
}

#[core_async::test]
async fn test_waiting_caller_survives_leader_cancellation() {
    let h = harness_with(
        FakeSource::with_delay(Duration::from_millis(100)),
        test_config(),
    )
    .await;
    h.source.publish(full_track("t1", "One")).await;

    let leader_token = CancellationToken::new();
    let leader = {
        let session = h.session.clone();
        let token = leader_token.clone();
        core_async::spawn(async move {
            session
                .ensure_cached_with(EntityKind::Track, &id("t1"), &token)
                .await
        })
    };
    sleep(Duration::from_millis(10)).await;

    let follower = {
        let session = h.session.clone();
        core_async::spawn(async move { session.ensure_cached(EntityKind::Track, &id("t1")).await })
    };
    sleep(Duration::from_millis(10)).await;
    leader_token.cancel();

    assert_eq!(leader.await.unwrap().unwrap_err(), SyncError::Cancelled);
    let entity = follower.await.unwrap().unwrap();
    assert_eq!(entity.name(), Some("One"));
    assert_eq!(h.source.fetch_count(), 2);
}

// ============================================================================
// Favorites
// ============================================================================

#[core_async::test]
async fn test_reconcile_favorites_adds_missing_track() -> anyhow::Result<()> {
    let h = harness().await;
    let user = id("u1");

    let mut t1 = full_track("t1", "One");
    t1.timestamp = NOW;
    h.store.upsert(&Entity::from(t1)).await?;
    h.store
        .add_membership(CollectionKind::Favorites, &user, &[id("t1")], NOW)
        .await?;

    h.source.publish(full_track("t2", "Two")).await;
    h.source
        .list(
            CollectionKind::Favorites,
            "u1",
            vec![
                Track::new("t1", 0)?.with_name("One").into(),
                Track::new("t2", 0)?.with_name("Two").into(),
            ],
        )
        .await;

    let report = h.session.reconcile_favorites(&user).await?;

    let added: Vec<&str> = report.added.iter().map(|t| t.name.as_deref().unwrap()).collect();
    assert_eq!(added, vec!["Two"]);
    assert!(report.removed.is_empty());
    assert!(report.is_clean());
    assert_eq!(favorites_of(&h, "u1").await, vec![id("t1"), id("t2")]);
    // t1 was fresh and agreed with its summary.
    assert_eq!(h.source.fetch_count(), 1);
    Ok(())
}

#[core_async::test]
async fn test_removed_favorite_keeps_track_row() -> anyhow::Result<()> {
    let h = harness().await;
    let user = id("u1");

    for track_id in ["t1", "t3"] {
        let mut track = full_track(track_id, track_id);
        track.timestamp = NOW;
        h.store.upsert(&Entity::from(track)).await?;
    }
    h.store
        .add_membership(CollectionKind::Favorites, &user, &[id("t1"), id("t3")], NOW)
        .await?;
    h.source
        .list(
            CollectionKind::Favorites,
            "u1",
            vec![Track::new("t1", 0)?.with_name("t1").into()],
        )
        .await;

    let report = h.session.reconcile_favorites(&user).await?;

    assert!(report.added.is_empty());
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.removed[0].name.as_deref(), Some("t3"));
    assert_eq!(favorites_of(&h, "u1").await, vec![id("t1")]);
    assert!(h.store.get(EntityKind::Track, &id("t3")).await?.is_some());
    Ok(())
}

#[core_async::test]
async fn test_uncacheable_favorite_is_reported_not_linked() -> anyhow::Result<()> {
    let h = harness().await;
    let user = id("u1");

    h.source.publish(full_track("t1", "One")).await;
    h.source
        .list(
            CollectionKind::Favorites,
            "u1",
            vec![
                Track::new("t1", 0)?.into(),
                Track::new("gone", 0)?.into(),
            ],
        )
        .await;

    let report = h.session.reconcile_favorites(&user).await?;

    assert_eq!(report.added.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, id("gone"));
    assert!(matches!(report.failed[0].1, SyncError::NotFound { .. }));
    assert_eq!(favorites_of(&h, "u1").await, vec![id("t1")]);
    Ok(())
}

#[core_async::test]
async fn test_added_favorite_caches_its_artists() -> anyhow::Result<()> {
    let h = harness().await;
    let user = id("u1");

    let mut artist = Artist::new("a1", 0)?.with_name("Band");
    artist.followers = Some(10);
    h.source.publish(artist).await;
    h.source
        .publish(full_track("t1", "One").with_artists(vec![Artist::new("a1", 0)?]))
        .await;
    h.source
        .list(
            CollectionKind::Favorites,
            "u1",
            vec![Track::new("t1", 0)?.into()],
        )
        .await;

    h.session.reconcile_favorites(&user).await?;

    let cached = h.store.get(EntityKind::Artist, &id("a1")).await?.unwrap();
    assert_eq!(cached.name(), Some("Band"));
    assert_eq!(cached.timestamp(), NOW);
    Ok(())
}

#[core_async::test]
async fn test_paging_stops_on_short_page() -> anyhow::Result<()> {
    let h = harness().await;
    let listing: Vec<Entity> = (0..5)
        .map(|i| Track::new(format!("t{}", i), 0).map(Entity::from))
        .collect::<Result<_, _>>()?;
    h.source
        .list(CollectionKind::Favorites, "u1", listing)
        .await;

    let items = h
        .session
        .fetch_collection(CollectionKind::Favorites, &id("u1"), &CancellationToken::new())
        .await?;

    assert_eq!(items.len(), 5);
    assert_eq!(h.source.page_count(), 3);
    Ok(())
}

#[core_async::test]
async fn test_paging_stops_at_item_cap() -> anyhow::Result<()> {
    let config = SessionConfig {
        max_collection_items: Some(3),
        ..test_config()
    };
    let h = harness_with(FakeSource::default(), config).await;
    let listing: Vec<Entity> = (0..10)
        .map(|i| Track::new(format!("t{}", i), 0).map(Entity::from))
        .collect::<Result<_, _>>()?;
    h.source
        .list(CollectionKind::Favorites, "u1", listing)
        .await;

    let items = h
        .session
        .fetch_collection(CollectionKind::Favorites, &id("u1"), &CancellationToken::new())
        .await?;

    assert_eq!(items.len(), 3);
    assert_eq!(h.source.page_count(), 2);
    Ok(())
}

// ============================================================================
// Followed playlists
// ============================================================================

#[core_async::test]
async fn test_reconcile_playlists_keeps_owned_playlists() -> anyhow::Result<()> {
    let events = EventBus::new(64);
    let mut rx = events.subscribe();
    let mut h = harness().await;
    h.session = h.session.clone().with_events(events);
    let user = id("u1");

    h.source.publish(full_track("t1", "One")).await;
    h.source
        .publish(
            Playlist::new("p1", 0)?
                .with_name("Mine")
                .with_owner(id("u1"))
                .with_tracks(vec![Track::new("t1", 0)?]),
        )
        .await;
    h.source
        .list(
            CollectionKind::FollowedPlaylists,
            "u1",
            vec![
                Playlist::new("p1", 0)?
                    .with_name("Mine")
                    .with_owner(id("u1"))
                    .into(),
                Playlist::new("p2", 0)?
                    .with_name("Theirs")
                    .with_owner(id("u2"))
                    .into(),
            ],
        )
        .await;

    let report = h.session.reconcile_playlists(&user).await?;

    assert_eq!(report.added, vec![id("p1")]);
    assert_eq!(report.playlists.len(), 1);
    assert!(report.is_clean());

    let followed = h
        .store
        .list_membership(CollectionKind::FollowedPlaylists, &user)
        .await?;
    assert_eq!(followed, vec![id("p1")]);

    let Entity::Playlist(stored) = h.store.get(EntityKind::Playlist, &id("p1")).await?.unwrap()
    else {
        panic!("expected a playlist");
    };
    assert_eq!(stored.following_user_id, Some(user.clone()));
    assert_eq!(stored.tracks.map(|t| t.len()), Some(1));

    let track = h.store.get(EntityKind::Track, &id("t1")).await?.unwrap();
    assert_eq!(track.name(), Some("One"));
    assert!(h.store.get(EntityKind::Playlist, &id("p2")).await?.is_none());

    let mut reconciled = None;
    while let Ok(event) = rx.try_recv() {
        if let CoreEvent::Reconcile(event @ ReconcileEvent::PlaylistsReconciled { .. }) = event {
            reconciled = Some(event);
        }
    }
    assert_eq!(
        reconciled,
        Some(ReconcileEvent::PlaylistsReconciled {
            user_id: "u1".to_string(),
            playlists: 1,
            added: 1,
            removed: 0,
            failed: 0,
        })
    );
    Ok(())
}

#[core_async::test]
async fn test_unfollowed_playlist_loses_membership_keeps_row() -> anyhow::Result<()> {
    let h = harness().await;
    let user = id("u1");

    let mut old = Playlist::new("p0", NOW)?
        .with_name("Dropped")
        .with_owner(user.clone());
    old.following_user_id = Some(user.clone());
    h.store.upsert(&Entity::from(old)).await?;
    h.store
        .add_membership(CollectionKind::FollowedPlaylists, &user, &[id("p0")], NOW)
        .await?;

    h.source
        .publish(Playlist::new("p1", 0)?.with_name("Kept").with_owner(user.clone()))
        .await;
    h.source
        .list(
            CollectionKind::FollowedPlaylists,
            "u1",
            vec![Playlist::new("p1", 0)?
                .with_name("Kept")
                .with_owner(user.clone())
                .into()],
        )
        .await;

    let report = h.session.reconcile_playlists(&user).await?;

    assert_eq!(report.added, vec![id("p1")]);
    assert_eq!(report.removed, vec![id("p0")]);
    let followed = h
        .store
        .list_membership(CollectionKind::FollowedPlaylists, &user)
        .await?;
    assert_eq!(followed, vec![id("p1")]);

    let dropped = h.store.get(EntityKind::Playlist, &id("p0")).await?.unwrap();
    assert_eq!(dropped.name(), Some("Dropped"));
    Ok(())
}

// ============================================================================
// Sweep
// ============================================================================

#[core_async::test]
async fn test_sweep_refreshes_only_candidates() -> anyhow::Result<()> {
    let h = harness().await;

    let mut stale = full_track("t1", "Stale");
    stale.timestamp = NOW - 2 * TTL_SECS as i64;
    stale.album = None;
    let mut fresh = full_track("t2", "Fresh").with_album(core_library::Album::new("al1", NOW)?);
    fresh.timestamp = NOW;
    h.store.upsert(&Entity::from(stale)).await?;
    h.store.upsert(&Entity::from(fresh)).await?;

    h.source.publish(full_track("t1", "Refetched")).await;

    let report = h.session.refresh_stale(EntityKind::Track, 10).await?;

    assert_eq!(report.candidates, 1);
    assert_eq!(report.refreshed, vec![id("t1")]);
    assert!(report.failed.is_empty());
    let refreshed = h.store.get(EntityKind::Track, &id("t1")).await?.unwrap();
    assert_eq!(refreshed.name(), Some("Refetched"));
    Ok(())
}
