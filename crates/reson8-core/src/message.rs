//! Persist-then-broadcast text messages and history pagination.

use reson8_db::messages::MessageRow;
use reson8_db::DbPool;
use reson8_models::channel::ChannelKind;
use reson8_models::permissions::Permissions;
use reson8_util::{snowflake, time, validation};

use crate::error::CoreError;
use crate::permissions::{permissions_for, require_permission};

pub const DEFAULT_PAGE: i64 = 50;
pub const MAX_PAGE: i64 = 100;

pub async fn send_message(
    pool: &DbPool,
    server_id: i64,
    user_id: &str,
    channel_id: i64,
    content: &str,
) -> Result<MessageRow, CoreError> {
    let mask = permissions_for(pool, server_id, user_id).await?;
    require_permission(mask, Permissions::SEND_MESSAGES)?;

    let content = content.trim();
    validation::validate_message_content(content)
        .map_err(|e| CoreError::InvalidInput(format!("message content: {e}")))?;

    let channel = reson8_db::channels::get_channel(pool, channel_id)
        .await?
        .ok_or(CoreError::NotFound("channel"))?;
    if channel.server_id != server_id {
        return Err(CoreError::NotFound("channel"));
    }
    if ChannelKind::parse(&channel.kind) != Some(ChannelKind::Text) {
        return Err(CoreError::InvalidInput(
            "channel does not accept text messages".to_string(),
        ));
    }

    let row =
        reson8_db::messages::create_message(pool, snowflake::generate(), channel_id, user_id, content)
            .await?;
    Ok(row)
}

/// Up to `min(limit, 100)` messages (default 50) older than `before`,
/// returned in chronological ascending order.
pub async fn fetch_messages(
    pool: &DbPool,
    channel_id: i64,
    before: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<MessageRow>, CoreError> {
    reson8_db::channels::get_channel(pool, channel_id)
        .await?
        .ok_or(CoreError::NotFound("channel"))?;

    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let cursor = match before {
        Some(raw) => Some(
            time::normalize_rfc3339(raw)
                .ok_or_else(|| CoreError::InvalidInput("invalid before cursor".to_string()))?,
        ),
        None => None,
    };

    let mut rows =
        reson8_db::messages::get_channel_messages(pool, channel_id, cursor.as_deref(), limit)
            .await?;
    rows.reverse();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stack() -> (DbPool, i64) {
        let pool = reson8_db::create_pool("sqlite::memory:", 1).await.unwrap();
        reson8_db::run_migrations(&pool).await.unwrap();
        let server_id = reson8_db::seed::seed_template(&pool, "test", "", 64)
            .await
            .unwrap();
        reson8_db::users::upsert_user(&pool, "install-0001", "Ada")
            .await
            .unwrap();
        reson8_db::seed::ensure_member_role(&pool, server_id, "install-0001")
            .await
            .unwrap();
        (pool, server_id)
    }

    async fn text_channel(pool: &DbPool, server_id: i64) -> i64 {
        let rows = reson8_db::channels::get_server_channels(pool, server_id)
            .await
            .unwrap();
        rows.iter().find(|c| c.kind == "TEXT").unwrap().id
    }

    #[tokio::test]
    async fn whitespace_content_is_rejected() {
        let (pool, server_id) = stack().await;
        let channel_id = text_channel(&pool, server_id).await;

        let err = send_message(&pool, server_id, "install-0001", channel_id, "   \n\t ")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn voice_channels_reject_messages() {
        let (pool, server_id) = stack().await;
        let rows = reson8_db::channels::get_server_channels(&pool, server_id)
            .await
            .unwrap();
        let voice = rows.iter().find(|c| c.kind == "VOICE").unwrap().id;

        let err = send_message(&pool, server_id, "install-0001", voice, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn content_is_trimmed_before_persisting() {
        let (pool, server_id) = stack().await;
        let channel_id = text_channel(&pool, server_id).await;

        let row = send_message(&pool, server_id, "install-0001", channel_id, "  hello  ")
            .await
            .unwrap();
        assert_eq!(row.content, "hello");
    }

    #[tokio::test]
    async fn pagination_over_a_backlog() {
        let (pool, server_id) = stack().await;
        let channel_id = text_channel(&pool, server_id).await;

        // 120 rows with strictly increasing timestamps.
        for i in 0..120 {
            sqlx::query(
                "INSERT INTO messages (id, channel_id, user_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(1000 + i)
            .bind(channel_id)
            .bind("install-0001")
            .bind(format!("m{i}"))
            .bind(format!("2026-02-01T00:00:{:02}.{:03}Z", i / 60, (i % 60) * 10))
            .execute(&pool)
            .await
            .unwrap();
        }

        let first = fetch_messages(&pool, channel_id, None, Some(50)).await.unwrap();
        assert_eq!(first.len(), 50);
        assert_eq!(first.first().unwrap().content, "m70");
        assert_eq!(first.last().unwrap().content, "m119");
        assert!(first.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let second = fetch_messages(
            &pool,
            channel_id,
            Some(&first.first().unwrap().created_at),
            Some(50),
        )
        .await
        .unwrap();
        assert_eq!(second.len(), 50);
        assert_eq!(second.first().unwrap().content, "m20");
        assert_eq!(second.last().unwrap().content, "m69");
    }

    #[tokio::test]
    async fn limit_is_capped_at_one_hundred() {
        let (pool, server_id) = stack().await;
        let channel_id = text_channel(&pool, server_id).await;

        for i in 0..110 {
            sqlx::query(
                "INSERT INTO messages (id, channel_id, user_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(2000 + i)
            .bind(channel_id)
            .bind("install-0001")
            .bind(format!("m{i}"))
            .bind(format!("2026-02-02T00:{:02}:{:02}.000Z", i / 60, i % 60))
            .execute(&pool)
            .await
            .unwrap();
        }

        let rows = fetch_messages(&pool, channel_id, None, Some(500)).await.unwrap();
        assert_eq!(rows.len(), 100);
    }
}
