//! Artist repository trait and implementation

use crate::error::Result;
use crate::models::{Artist, CatalogEntity, EntityId};
use crate::repositories::rows::{encode_json, widen, ArtistRow};
use crate::repositories::{candidate_ids, replace_links};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

/// Artist repository interface for data access operations
#[async_trait]
pub trait ArtistRepository: Send + Sync {
    /// Find an artist by its ID
    ///
    /// # Returns
    /// - `Ok(Some(artist))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Artist>>;

    /// Insert or replace an artist
    async fn upsert(&self, artist: &Artist) -> Result<()>;

    /// Ids of artists synced before `cutoff` or missing fields a full fetch supplies
    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>>;

    /// Count total artists
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of ArtistRepository
pub struct SqliteArtistRepository {
    pool: SqlitePool,
}

impl SqliteArtistRepository {
    /// Create a new SqliteArtistRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtistRepository for SqliteArtistRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<Artist>> {
        let row = query_as::<_, ArtistRow>("SELECT * FROM artists WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ArtistRow::into_artist).transpose()
    }

    async fn upsert(&self, artist: &Artist) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_artist(&mut tx, artist).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>> {
        candidate_ids(
            &self.pool,
            r#"
            SELECT id FROM artists
            WHERE timestamp <= 0 OR timestamp < ? OR name IS NULL OR followers IS NULL
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
            cutoff,
            limit,
        )
        .await
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM artists")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

pub(crate) async fn write_artist(conn: &mut SqliteConnection, artist: &Artist) -> Result<()> {
    query(
        r#"
        INSERT INTO artists (id, name, genres, images, popularity, followers, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            genres = excluded.genres,
            images = excluded.images,
            popularity = excluded.popularity,
            followers = excluded.followers,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(artist.id().as_str())
    .bind(&artist.name)
    .bind(encode_json(&artist.genres)?)
    .bind(encode_json(&artist.images)?)
    .bind(widen("popularity", artist.popularity)?)
    .bind(widen("followers", artist.followers)?)
    .bind(artist.timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Makes sure a row exists for an artist referenced by another entity.
///
/// New rows start at timestamp 0; existing rows only gain a missing name.
pub(crate) async fn write_artist_stub(conn: &mut SqliteConnection, artist: &Artist) -> Result<()> {
    query(
        r#"
        INSERT INTO artists (id, name, timestamp) VALUES (?, ?, 0)
        ON CONFLICT(id) DO UPDATE SET name = COALESCE(artists.name, excluded.name)
        "#,
    )
    .bind(artist.id().as_str())
    .bind(&artist.name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stubs every artist and records them, in order, in `table`.
pub(crate) async fn write_artist_links(
    conn: &mut SqliteConnection,
    table: &str,
    owner_column: &str,
    owner_id: &EntityId,
    artists: &[Artist],
) -> Result<()> {
    for artist in artists {
        write_artist_stub(conn, artist).await?;
    }
    let ids: Vec<&EntityId> = artists.iter().map(|a| a.id()).collect();
    replace_links(conn, table, owner_column, "artist_id", owner_id, &ids).await
}

/// Artists linked to `owner_id` through `table`, in listing order.
pub(crate) async fn load_linked_artists(
    pool: &SqlitePool,
    table: &str,
    owner_column: &str,
    owner_id: &EntityId,
) -> Result<Vec<Artist>> {
    let sql = format!(
        "SELECT a.* FROM artists a INNER JOIN {table} l ON l.artist_id = a.id \
         WHERE l.{owner_column} = ? ORDER BY l.position ASC"
    );
    let rows = query_as::<_, ArtistRow>(&sql)
        .bind(owner_id.as_str())
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(ArtistRow::into_artist).collect()
}
