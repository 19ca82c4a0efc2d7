pub mod channels;
pub mod messages;
pub mod roles;
pub mod seed;
pub mod servers;
pub mod users;

use sqlx::any::AnyPoolOptions;
use thiserror::Error;

pub type DbPool = sqlx::AnyPool;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("not found")]
    NotFound,
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    // Required once before using sqlx::Any.
    sqlx::any::install_default_drivers();

    let sqlite = database_url.trim().to_ascii_lowercase().starts_with("sqlite");
    AnyPoolOptions::new()
        .max_connections(max_connections)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                if sqlite {
                    // Tune SQLite for concurrent access; FKs drive the
                    // message cascade and parent re-rooting on delete.
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA synchronous = NORMAL;")
                        .execute(&mut *conn)
                        .await?;
                }
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("migrations: applied successfully");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_migrates() {
        let pool = test_pool().await;
        let value: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM servers")
            .fetch_one(&pool)
            .await
            .expect("query");
        assert_eq!(value, 0);
    }
}
