//! Membership edges between a user and the entities in their collections
//!
//! Removing a membership never touches the member's own row.

use crate::error::Result;
use crate::models::{CollectionKind, EntityId};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Member ids in the order they were added
    async fn list(&self, collection: CollectionKind, owner_id: &EntityId) -> Result<Vec<EntityId>>;

    /// Records new members; existing edges are left as they are.
    ///
    /// Returns the number of edges created.
    async fn add(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
        added_at: i64,
    ) -> Result<u64>;

    /// Returns the number of edges deleted.
    async fn remove(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
    ) -> Result<u64>;
}

pub struct SqliteMembershipRepository {
    pool: SqlitePool,
}

impl SqliteMembershipRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for SqliteMembershipRepository {
    async fn list(&self, collection: CollectionKind, owner_id: &EntityId) -> Result<Vec<EntityId>> {
        let rows: Vec<(String,)> = query_as(
            r#"
            SELECT member_id FROM memberships
            WHERE collection = ? AND owner_id = ?
            ORDER BY added_at ASC, rowid ASC
            "#,
        )
        .bind(collection.as_str())
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|(id,)| EntityId::new(id)).collect()
    }

    async fn add(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
        added_at: i64,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0;
        for member in members {
            let result = query(
                r#"
                INSERT OR IGNORE INTO memberships (collection, owner_id, member_id, added_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(collection.as_str())
            .bind(owner_id.as_str())
            .bind(member.as_str())
            .bind(added_at)
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected();
        }
        tx.commit().await?;

        Ok(created)
    }

    async fn remove(
        &self,
        collection: CollectionKind,
        owner_id: &EntityId,
        members: &[EntityId],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for member in members {
            let result = query(
                "DELETE FROM memberships WHERE collection = ? AND owner_id = ? AND member_id = ?",
            )
            .bind(collection.as_str())
            .bind(owner_id.as_str())
            .bind(member.as_str())
            .execute(&mut *tx)
            .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }
}
