use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServerRow {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub max_clients: i64,
    pub created_at: String,
}

pub async fn create_server(
    pool: &DbPool,
    id: i64,
    name: &str,
    address: &str,
    max_clients: i64,
) -> Result<ServerRow, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(
        "INSERT INTO servers (id, name, address, max_clients, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, name, address, max_clients, created_at",
    )
    .bind(id)
    .bind(name)
    .bind(address)
    .bind(max_clients)
    .bind(reson8_util::time::now_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_server(pool: &DbPool, id: i64) -> Result<Option<ServerRow>, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(
        "SELECT id, name, address, max_clients, created_at FROM servers WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The typical deployment has exactly one server row; clients that omit a
/// server id are routed to it.
pub async fn default_server(pool: &DbPool) -> Result<Option<ServerRow>, DbError> {
    let row = sqlx::query_as::<_, ServerRow>(
        "SELECT id, name, address, max_clients, created_at FROM servers ORDER BY id LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
