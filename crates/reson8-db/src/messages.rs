use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub channel_id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: String,
}

pub async fn create_message(
    pool: &DbPool,
    id: i64,
    channel_id: i64,
    user_id: &str,
    content: &str,
) -> Result<MessageRow, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, channel_id, user_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, channel_id, user_id, content, created_at",
    )
    .bind(id)
    .bind(channel_id)
    .bind(user_id)
    .bind(content)
    .bind(reson8_util::time::now_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Newest-first page of messages older than `before` (exclusive).
/// Callers reverse into chronological order before emitting.
pub async fn get_channel_messages(
    pool: &DbPool,
    channel_id: i64,
    before: Option<&str>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = match before {
        Some(cursor) => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT id, channel_id, user_id, content, created_at
                 FROM messages
                 WHERE channel_id = ?1 AND created_at < ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )
            .bind(channel_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, MessageRow>(
                "SELECT id, channel_id, user_id, content, created_at
                 FROM messages
                 WHERE channel_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )
            .bind(channel_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn before_cursor_is_exclusive() {
        let pool = test_pool().await;
        crate::servers::create_server(&pool, 1, "test", "", 64)
            .await
            .unwrap();
        crate::users::upsert_user(&pool, "install-0001", "Ada")
            .await
            .unwrap();
        crate::channels::create_channel(&pool, 10, 1, "general", "TEXT", None, 0, None)
            .await
            .unwrap();

        for i in 0..3 {
            create_message(&pool, 100 + i, 10, "install-0001", &format!("m{i}"))
                .await
                .unwrap();
        }

        let newest = get_channel_messages(&pool, 10, None, 50).await.unwrap();
        assert_eq!(newest.len(), 3);
        assert_eq!(newest[0].content, "m2");

        let older = get_channel_messages(&pool, 10, Some(&newest[0].created_at), 50)
            .await
            .unwrap();
        assert!(older.iter().all(|m| m.created_at < newest[0].created_at));
    }
}
