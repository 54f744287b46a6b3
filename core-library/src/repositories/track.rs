//! Track repository trait and implementation

use crate::error::Result;
use crate::models::{Album, CatalogEntity, EntityId, Track};
use crate::repositories::album::{load_album_summary, write_album_stub};
use crate::repositories::artist::{load_linked_artists, write_artist_links};
use crate::repositories::rows::{widen, TrackRow};
use crate::repositories::{candidate_ids, replace_links};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

/// Track repository interface for data access operations
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Find a track by its ID, with its artists and album
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Track>>;

    /// Insert or replace a track, its artist links and its album reference
    async fn upsert(&self, track: &Track) -> Result<()>;

    /// Ids of tracks synced before `cutoff` or missing name, duration or album
    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>>;

    /// Count total tracks
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of TrackRepository
pub struct SqliteTrackRepository {
    pool: SqlitePool,
}

impl SqliteTrackRepository {
    /// Create a new SqliteTrackRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackRepository for SqliteTrackRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Track>> {
        let row = query_as::<_, TrackRow>("SELECT * FROM tracks WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let album_id = row.album_id.clone().map(EntityId::new).transpose()?;
        let mut track = row.into_track()?;
        track.artists = load_linked_artists(&self.pool, "track_artists", "track_id", id).await?;

        if let Some(album_id) = album_id {
            let album = match load_album_summary(&self.pool, &album_id).await? {
                Some(album) => album,
                None => Album::stub(album_id, 0),
            };
            track.album = Some(Box::new(album));
        }

        Ok(Some(track))
    }

    async fn upsert(&self, track: &Track) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_track(&mut tx, track).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>> {
        candidate_ids(
            &self.pool,
            r#"
            SELECT id FROM tracks
            WHERE timestamp <= 0 OR timestamp < ?
               OR name IS NULL OR duration_ms IS NULL OR album_id IS NULL
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
            cutoff,
            limit,
        )
        .await
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM tracks")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

pub(crate) async fn write_track(conn: &mut SqliteConnection, track: &Track) -> Result<()> {
    if let Some(album) = &track.album {
        write_album_stub(conn, album).await?;
    }

    query(
        r#"
        INSERT INTO tracks (
            id, name, duration_ms, disc_number, track_number, explicit,
            popularity, album_id, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            duration_ms = excluded.duration_ms,
            disc_number = excluded.disc_number,
            track_number = excluded.track_number,
            explicit = excluded.explicit,
            popularity = excluded.popularity,
            album_id = excluded.album_id,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(track.id().as_str())
    .bind(&track.name)
    .bind(widen("duration_ms", track.duration_ms)?)
    .bind(widen("disc_number", track.disc_number)?)
    .bind(widen("track_number", track.track_number)?)
    .bind(track.explicit)
    .bind(widen("popularity", track.popularity)?)
    .bind(track.album_id().map(EntityId::as_str))
    .bind(track.timestamp)
    .execute(&mut *conn)
    .await?;

    write_artist_links(conn, "track_artists", "track_id", track.id(), &track.artists).await
}

/// Makes sure a row exists for a track listed by an album or playlist.
///
/// `album_hint` fills in the album of a track that has none recorded yet.
pub(crate) async fn write_track_stub(
    conn: &mut SqliteConnection,
    track: &Track,
    album_hint: Option<&EntityId>,
) -> Result<()> {
    let album_id = track.album_id().or(album_hint);

    query(
        r#"
        INSERT INTO tracks (id, name, album_id, timestamp) VALUES (?, ?, ?, 0)
        ON CONFLICT(id) DO UPDATE SET
            name = COALESCE(tracks.name, excluded.name),
            album_id = COALESCE(tracks.album_id, excluded.album_id)
        "#,
    )
    .bind(track.id().as_str())
    .bind(&track.name)
    .bind(album_id.map(EntityId::as_str))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stubs every track and records them, in order, in `table`.
pub(crate) async fn write_track_links(
    conn: &mut SqliteConnection,
    table: &str,
    owner_column: &str,
    owner_id: &EntityId,
    tracks: &[Track],
    album_hint: Option<&EntityId>,
) -> Result<()> {
    for track in tracks {
        write_track_stub(conn, track, album_hint).await?;
    }
    let ids: Vec<&EntityId> = tracks.iter().map(|t| t.id()).collect();
    replace_links(conn, table, owner_column, "track_id", owner_id, &ids).await
}

/// Tracks linked to `owner_id` through `table`, in listing order, without
/// their own artists or album.
pub(crate) async fn load_linked_tracks(
    pool: &SqlitePool,
    table: &str,
    owner_column: &str,
    owner_id: &EntityId,
) -> Result<Vec<Track>> {
    let sql = format!(
        "SELECT t.* FROM tracks t INNER JOIN {table} l ON l.track_id = t.id \
         WHERE l.{owner_column} = ? ORDER BY l.position ASC"
    );
    let rows = query_as::<_, TrackRow>(&sql)
        .bind(owner_id.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(TrackRow::into_track).collect()
}
