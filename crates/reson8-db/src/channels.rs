use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub kind: String,
    pub parent_id: Option<i64>,
    pub position: i64,
    pub max_users: Option<i64>,
    pub created_at: String,
}

const COLUMNS: &str = "id, server_id, name, kind, parent_id, position, max_users, created_at";

pub async fn create_channel(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    name: &str,
    kind: &str,
    parent_id: Option<i64>,
    position: i64,
    max_users: Option<i64>,
) -> Result<ChannelRow, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(
        "INSERT INTO channels (id, server_id, name, kind, parent_id, position, max_users, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING id, server_id, name, kind, parent_id, position, max_users, created_at",
    )
    .bind(id)
    .bind(server_id)
    .bind(name)
    .bind(kind)
    .bind(parent_id)
    .bind(position)
    .bind(max_users)
    .bind(reson8_util::time::now_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_channel(pool: &DbPool, id: i64) -> Result<Option<ChannelRow>, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {COLUMNS} FROM channels WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_server_channels(pool: &DbPool, server_id: i64) -> Result<Vec<ChannelRow>, DbError> {
    let rows = sqlx::query_as::<_, ChannelRow>(&format!(
        "SELECT {COLUMNS} FROM channels WHERE server_id = ?1 ORDER BY position, id"
    ))
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Next position among the siblings of `parent_id`: max + 1, starting at 0.
pub async fn next_sibling_position(
    pool: &DbPool,
    server_id: i64,
    parent_id: Option<i64>,
) -> Result<i64, DbError> {
    let max: Option<i64> = match parent_id {
        Some(parent) => {
            sqlx::query_scalar(
                "SELECT MAX(position) FROM channels WHERE server_id = ?1 AND parent_id = ?2",
            )
            .bind(server_id)
            .bind(parent)
            .fetch_one(pool)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "SELECT MAX(position) FROM channels WHERE server_id = ?1 AND parent_id IS NULL",
            )
            .bind(server_id)
            .fetch_one(pool)
            .await?
        }
    };
    Ok(max.unwrap_or(-1) + 1)
}

pub async fn update_channel(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    max_users: Option<Option<i64>>,
) -> Result<ChannelRow, DbError> {
    // max_users is tri-state: absent = keep, Some(None) = clear the cap.
    let row = match max_users {
        None => {
            sqlx::query_as::<_, ChannelRow>(
                "UPDATE channels SET name = COALESCE(?2, name)
                 WHERE id = ?1
                 RETURNING id, server_id, name, kind, parent_id, position, max_users, created_at",
            )
            .bind(id)
            .bind(name)
            .fetch_one(pool)
            .await?
        }
        Some(value) => {
            sqlx::query_as::<_, ChannelRow>(
                "UPDATE channels SET name = COALESCE(?2, name), max_users = ?3
                 WHERE id = ?1
                 RETURNING id, server_id, name, kind, parent_id, position, max_users, created_at",
            )
            .bind(id)
            .bind(name)
            .bind(value)
            .fetch_one(pool)
            .await?
        }
    };
    Ok(row)
}

pub async fn move_channel(
    pool: &DbPool,
    id: i64,
    parent_id: Option<i64>,
    position: i64,
) -> Result<ChannelRow, DbError> {
    let row = sqlx::query_as::<_, ChannelRow>(
        "UPDATE channels SET parent_id = ?2, position = ?3
         WHERE id = ?1
         RETURNING id, server_id, name, kind, parent_id, position, max_users, created_at",
    )
    .bind(id)
    .bind(parent_id)
    .bind(position)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Deleting a channel cascades to its messages; children are re-rooted by
/// the parent_id FK (ON DELETE SET NULL).
pub async fn delete_channel(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM channels WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
