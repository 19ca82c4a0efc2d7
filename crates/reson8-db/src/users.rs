use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub nickname: String,
    pub credential: Option<String>,
    pub created_at: String,
}

/// First JOIN_SERVER creates the record; later joins refresh the nickname.
/// The id is the client's persistent installation identifier.
pub async fn upsert_user(pool: &DbPool, id: &str, nickname: &str) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, username, nickname, created_at)
         VALUES (?1, ?2, ?2, ?3)
         ON CONFLICT (id) DO UPDATE SET nickname = excluded.nickname
         RETURNING id, username, nickname, credential, created_at",
    )
    .bind(id)
    .bind(nickname)
    .bind(reson8_util::time::now_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user(pool: &DbPool, id: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, nickname, credential, created_at FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
