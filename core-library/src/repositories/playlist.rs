//! Playlist repository trait and implementation

use crate::error::Result;
use crate::models::{CatalogEntity, EntityId, Playlist};
use crate::repositories::candidate_ids;
use crate::repositories::rows::{encode_json, PlaylistRow};
use crate::repositories::track::{load_linked_tracks, write_track_links};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

/// Playlist repository interface for data access operations
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    /// Find a playlist by its ID, with its tracks when a listing is known
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Playlist>>;

    /// Insert or replace a playlist
    ///
    /// A `None` track listing leaves the stored listing untouched.
    async fn upsert(&self, playlist: &Playlist) -> Result<()>;

    /// Playlists owned by a user, by id
    async fn find_by_owner(&self, owner_id: &EntityId) -> Result<Vec<EntityId>>;

    /// Ids of playlists synced before `cutoff` or without a name or track listing
    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>>;

    /// Count total playlists
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PlaylistRepository
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
}

impl SqlitePlaylistRepository {
    /// Create a new SqlitePlaylistRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Playlist>> {
        let row = query_as::<_, PlaylistRow>("SELECT * FROM playlists WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tracks_listed = row.tracks_listed != 0;
        let mut playlist = row.into_playlist()?;
        if tracks_listed {
            playlist.tracks =
                Some(load_linked_tracks(&self.pool, "playlist_tracks", "playlist_id", id).await?);
        }

        Ok(Some(playlist))
    }

    async fn upsert(&self, playlist: &Playlist) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_playlist(&mut tx, playlist).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_owner(&self, owner_id: &EntityId) -> Result<Vec<EntityId>> {
        let rows: Vec<(String,)> =
            query_as("SELECT id FROM playlists WHERE owner_id = ? ORDER BY id ASC")
                .bind(owner_id.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|(id,)| EntityId::new(id)).collect()
    }

    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>> {
        candidate_ids(
            &self.pool,
            r#"
            SELECT id FROM playlists
            WHERE timestamp <= 0 OR timestamp < ? OR name IS NULL OR tracks_listed = 0
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
            cutoff,
            limit,
        )
        .await
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM playlists")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

pub(crate) async fn write_playlist(conn: &mut SqliteConnection, playlist: &Playlist) -> Result<()> {
    query(
        r#"
        INSERT INTO playlists (
            id, name, description, image_url, managed, genres, owner_id,
            following_user_id, tracks_listed, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            image_url = excluded.image_url,
            managed = excluded.managed,
            genres = excluded.genres,
            owner_id = excluded.owner_id,
            following_user_id = excluded.following_user_id,
            tracks_listed = MAX(playlists.tracks_listed, excluded.tracks_listed),
            timestamp = excluded.timestamp
        "#,
    )
    .bind(playlist.id().as_str())
    .bind(&playlist.name)
    .bind(&playlist.description)
    .bind(&playlist.image_url)
    .bind(playlist.managed)
    .bind(encode_json(&playlist.genres)?)
    .bind(playlist.owner_id.as_ref().map(EntityId::as_str))
    .bind(playlist.following_user_id.as_ref().map(EntityId::as_str))
    .bind(playlist.tracks.is_some())
    .bind(playlist.timestamp)
    .execute(&mut *conn)
    .await?;

    if let Some(tracks) = &playlist.tracks {
        write_track_links(
            conn,
            "playlist_tracks",
            "playlist_id",
            playlist.id(),
            tracks,
            None,
        )
        .await?;
    }

    Ok(())
}
