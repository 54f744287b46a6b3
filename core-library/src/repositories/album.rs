//! Album repository trait and implementation

use crate::error::Result;
use crate::models::{Album, CatalogEntity, EntityId};
use crate::repositories::artist::{load_linked_artists, write_artist_links};
use crate::repositories::candidate_ids;
use crate::repositories::rows::{encode_json, widen, AlbumRow};
use crate::repositories::track::{load_linked_tracks, write_track_links};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

/// Album repository interface for data access operations
#[async_trait]
pub trait AlbumRepository: Send + Sync {
    /// Find an album by its ID, with its artists and, when known, its tracks
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Album>>;

    /// Insert or replace an album
    ///
    /// A `None` track listing leaves the stored listing untouched.
    async fn upsert(&self, album: &Album) -> Result<()>;

    /// Ids of albums synced before `cutoff` or without a name, release date or track listing
    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>>;

    /// Count total albums
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of AlbumRepository
pub struct SqliteAlbumRepository {
    pool: SqlitePool,
}

impl SqliteAlbumRepository {
    /// Create a new SqliteAlbumRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlbumRepository for SqliteAlbumRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Album>> {
        let row = query_as::<_, AlbumRow>("SELECT * FROM albums WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tracks_listed = row.tracks_listed != 0;
        let mut album = row.into_album()?;
        album.artists = load_linked_artists(&self.pool, "album_artists", "album_id", id).await?;
        if tracks_listed {
            album.tracks =
                Some(load_linked_tracks(&self.pool, "album_tracks", "album_id", id).await?);
        }

        Ok(Some(album))
    }

    async fn upsert(&self, album: &Album) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_album(&mut tx, album).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>> {
        candidate_ids(
            &self.pool,
            r#"
            SELECT id FROM albums
            WHERE timestamp <= 0 OR timestamp < ?
               OR name IS NULL OR release_date IS NULL OR tracks_listed = 0
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
            cutoff,
            limit,
        )
        .await
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM albums")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

pub(crate) async fn write_album(conn: &mut SqliteConnection, album: &Album) -> Result<()> {
    query(
        r#"
        INSERT INTO albums (
            id, name, release_date, total_tracks, popularity, images,
            tracks_listed, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            release_date = excluded.release_date,
            total_tracks = excluded.total_tracks,
            popularity = excluded.popularity,
            images = excluded.images,
            tracks_listed = MAX(albums.tracks_listed, excluded.tracks_listed),
            timestamp = excluded.timestamp
        "#,
    )
    .bind(album.id().as_str())
    .bind(&album.name)
    .bind(&album.release_date)
    .bind(widen("total_tracks", album.total_tracks)?)
    .bind(widen("popularity", album.popularity)?)
    .bind(encode_json(&album.images)?)
    .bind(album.tracks.is_some())
    .bind(album.timestamp)
    .execute(&mut *conn)
    .await?;

    write_artist_links(conn, "album_artists", "album_id", album.id(), &album.artists).await?;

    if let Some(tracks) = &album.tracks {
        write_track_links(
            conn,
            "album_tracks",
            "album_id",
            album.id(),
            tracks,
            Some(album.id()),
        )
        .await?;
    }

    Ok(())
}

/// Makes sure a row exists for an album referenced by a track.
pub(crate) async fn write_album_stub(conn: &mut SqliteConnection, album: &Album) -> Result<()> {
    query(
        r#"
        INSERT INTO albums (id, name, timestamp) VALUES (?, ?, 0)
        ON CONFLICT(id) DO UPDATE SET name = COALESCE(albums.name, excluded.name)
        "#,
    )
    .bind(album.id().as_str())
    .bind(&album.name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// The album row alone, for embedding in a track.
pub(crate) async fn load_album_summary(pool: &SqlitePool, id: &EntityId) -> Result<Option<Album>> {
    let row = query_as::<_, AlbumRow>("SELECT * FROM albums WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    row.map(AlbumRow::into_album).transpose()
}
