//! # Catalog Store
//!
//! Kind-erased access to the local mirror. This is the only persistence
//! surface the sync layer sees: read an entity, upsert an already merged
//! entity, and edit membership edges.

use crate::error::Result;
use crate::models::{CollectionKind, Entity, EntityId, EntityKind};
use crate::repositories::{
    AlbumRepository, ArtistRepository, MembershipRepository, PlaylistRepository,
    SqliteAlbumRepository, SqliteArtistRepository, SqliteMembershipRepository,
    SqlitePlaylistRepository, SqliteTrackRepository, SqliteUserRepository, TrackRepository,
    UserRepository,
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// The stored entity, hydrated one level deep, or `None` if absent.
    async fn get(&self, kind: EntityKind, id: &EntityId) -> Result<Option<Entity>>;

    /// Writes the entity as given, atomically. Callers merge first.
    async fn upsert(&self, entity: &Entity) -> Result<()>;

    async fn list_membership(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
    ) -> Result<Vec<EntityId>>;

    async fn add_membership(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
        added_at: i64,
    ) -> Result<u64>;

    async fn remove_membership(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
    ) -> Result<u64>;

    /// Ids of `kind` synced before `cutoff`, never synced, or missing fields a
    /// full fetch supplies. Oldest first.
    async fn list_refresh_candidates(
        &self,
        kind: EntityKind,
        cutoff: i64,
        limit: u32,
    ) -> Result<Vec<EntityId>>;
}

/// SQLite-backed [`CatalogStore`] composed from the per-kind repositories.
pub struct SqliteCatalogStore {
    artists: SqliteArtistRepository,
    tracks: SqliteTrackRepository,
    albums: SqliteAlbumRepository,
    playlists: SqlitePlaylistRepository,
    users: SqliteUserRepository,
    memberships: SqliteMembershipRepository,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            artists: SqliteArtistRepository::new(pool.clone()),
            tracks: SqliteTrackRepository::new(pool.clone()),
            albums: SqliteAlbumRepository::new(pool.clone()),
            playlists: SqlitePlaylistRepository::new(pool.clone()),
            users: SqliteUserRepository::new(pool.clone()),
            memberships: SqliteMembershipRepository::new(pool),
        }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn get(&self, kind: EntityKind, id: &EntityId) -> Result<Option<Entity>> {
        let entity = match kind {
            EntityKind::Artist => self.artists.find_by_id(id).await?.map(Entity::from),
            EntityKind::Track => self.tracks.find_by_id(id).await?.map(Entity::from),
            EntityKind::Album => self.albums.find_by_id(id).await?.map(Entity::from),
            EntityKind::Playlist => self.playlists.find_by_id(id).await?.map(Entity::from),
            EntityKind::User => self.users.find_by_id(id).await?.map(Entity::from),
        };
        Ok(entity)
    }

    #[instrument(skip(self, entity), fields(kind = %entity.kind(), id = %entity.id()))]
    async fn upsert(&self, entity: &Entity) -> Result<()> {
        match entity {
            Entity::Artist(artist) => self.artists.upsert(artist).await?,
            Entity::Track(track) => self.tracks.upsert(track).await?,
            Entity::Album(album) => self.albums.upsert(album).await?,
            Entity::Playlist(playlist) => self.playlists.upsert(playlist).await?,
            Entity::User(user) => self.users.upsert(user).await?,
        }
        debug!(timestamp = entity.timestamp(), "Entity persisted");
        Ok(())
    }

    async fn list_membership(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
    ) -> Result<Vec<EntityId>> {
        self.memberships.list(collection, owner_id).await
    }

    async fn add_membership(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
        added_at: i64,
    ) -> Result<u64> {
        self.memberships
            .add(collection, owner_id, members, added_at)
            .await
    }

    async fn remove_membership(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
    ) -> Result<u64> {
        self.memberships.remove(collection, owner_id, members).await
    }

    async fn list_refresh_candidates(
        &self,
        kind: EntityKind,
        cutoff: i64,
        limit: u32,
    ) -> Result<Vec<EntityId>> {
        match kind {
            EntityKind::Artist => self.artists.refresh_candidates(cutoff, limit).await,
            EntityKind::Track => self.tracks.refresh_candidates(cutoff, limit).await,
            EntityKind::Album => self.albums.refresh_candidates(cutoff, limit).await,
            EntityKind::Playlist => self.playlists.refresh_candidates(cutoff, limit).await,
            EntityKind::User => self.users.refresh_candidates(cutoff, limit).await,
        }
    }
}
