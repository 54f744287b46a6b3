//! User repository trait and implementation

use crate::error::Result;
use crate::models::{CatalogEntity, EntityId, User};
use crate::repositories::candidate_ids;
use crate::repositories::rows::{encode_json, widen, UserRow};
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<User>>;

    async fn upsert(&self, user: &User) -> Result<()>;

    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<User>> {
        let row = query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn upsert(&self, user: &User) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_user(&mut tx, user).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_candidates(&self, cutoff: i64, limit: u32) -> Result<Vec<EntityId>> {
        candidate_ids(
            &self.pool,
            r#"
            SELECT id FROM users
            WHERE timestamp <= 0 OR timestamp < ? OR (name IS NULL AND display_name IS NULL)
            ORDER BY timestamp ASC, id ASC
            LIMIT ?
            "#,
            cutoff,
            limit,
        )
        .await
    }
}

pub(crate) async fn write_user(conn: &mut SqliteConnection, user: &User) -> Result<()> {
    let auth_token = user.auth_token.as_ref().map(encode_json).transpose()?;

    query(
        r#"
        INSERT INTO users (
            id, name, display_name, email, image_url, followers, auth_token, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            display_name = excluded.display_name,
            email = excluded.email,
            image_url = excluded.image_url,
            followers = excluded.followers,
            auth_token = excluded.auth_token,
            timestamp = excluded.timestamp
        "#,
    )
    .bind(user.id().as_str())
    .bind(&user.name)
    .bind(&user.display_name)
    .bind(&user.email)
    .bind(&user.image_url)
    .bind(widen("followers", user.followers)?)
    .bind(auth_token)
    .bind(user.timestamp)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
