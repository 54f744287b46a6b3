//! # Repository Pattern Implementation
//!
//! One repository per entity kind, plus membership edges and the
//! [`CatalogStore`] facade the sync layer talks to.
//!
//! ## Persistence model
//!
//! - Each upsert runs in a single transaction
//! - Nested entities are persisted by id only. A referenced entity that has no
//!   row yet gets a stub row at timestamp 0, which makes it stale until it is
//!   fetched on its own
//! - Reads hydrate one level: a track comes back with its artists and album,
//!   but that album carries no artists or tracks of its own
//!
//! ## Available Repositories
//!
//! - `ArtistRepository`, `TrackRepository`, `AlbumRepository`,
//!   `PlaylistRepository`, `UserRepository`
//! - `MembershipRepository` - favorites and followed playlists per user

pub mod album;
pub mod artist;
pub mod catalog;
pub mod membership;
pub mod pagination;
pub mod playlist;
pub(crate) mod rows;
pub mod track;
pub mod user;

pub use album::{AlbumRepository, SqliteAlbumRepository};
pub use artist::{ArtistRepository, SqliteArtistRepository};
pub use catalog::{CatalogStore, SqliteCatalogStore};
pub use membership::{MembershipRepository, SqliteMembershipRepository};
pub use pagination::PageRequest;
pub use playlist::{PlaylistRepository, SqlitePlaylistRepository};
pub use track::{SqliteTrackRepository, TrackRepository};
pub use user::{SqliteUserRepository, UserRepository};

use crate::error::Result;
use crate::models::EntityId;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

/// Replaces every link row owned by `owner_id` in `table` with `members`, in order.
pub(crate) async fn replace_links(
    conn: &mut SqliteConnection,
    table: &str,
    owner_column: &str,
    member_column: &str,
    owner_id: &EntityId,
    members: &[&EntityId],
) -> Result<()> {
    query(&format!("DELETE FROM {table} WHERE {owner_column} = ?"))
        .bind(owner_id.as_str())
        .execute(&mut *conn)
        .await?;

    let insert = format!(
        "INSERT OR IGNORE INTO {table} ({owner_column}, {member_column}, position) VALUES (?, ?, ?)"
    );
    for (position, member) in members.iter().enumerate() {
        query(&insert)
            .bind(owner_id.as_str())
            .bind(member.as_str())
            .bind(position as i64)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Runs a `(cutoff, limit)` query that selects a single `id` column.
pub(crate) async fn candidate_ids(
    pool: &SqlitePool,
    sql: &str,
    cutoff: i64,
    limit: u32,
) -> Result<Vec<EntityId>> {
    let rows: Vec<(String,)> = query_as(sql)
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(|(id,)| EntityId::new(id)).collect()
}
