//! Channel CRUD: permission check, structural validation, then the durable
//! mutation. Tree rebuild and broadcast happen at the gateway after every
//! mutation here succeeds.

use reson8_db::channels::ChannelRow;
use reson8_db::DbPool;
use reson8_models::channel::ChannelKind;
use reson8_models::permissions::Permissions;
use reson8_util::{snowflake, validation};

use crate::error::CoreError;
use crate::permissions::{permissions_for, require_permission};

pub struct CreateChannel<'a> {
    pub name: &'a str,
    pub kind: ChannelKind,
    pub parent_id: Option<i64>,
    pub max_users: Option<i64>,
}

pub async fn create_channel(
    pool: &DbPool,
    server_id: i64,
    user_id: &str,
    request: CreateChannel<'_>,
) -> Result<ChannelRow, CoreError> {
    let mask = permissions_for(pool, server_id, user_id).await?;
    require_permission(mask, Permissions::CREATE_CHANNEL)?;

    let name = request.name.trim();
    validation::validate_channel_name(name)
        .map_err(|e| CoreError::InvalidInput(format!("channel name: {e}")))?;

    if let Some(parent_id) = request.parent_id {
        let parent = reson8_db::channels::get_channel(pool, parent_id)
            .await?
            .ok_or(CoreError::NotFound("parent channel"))?;
        if parent.server_id != server_id {
            return Err(CoreError::NotFound("parent channel"));
        }
    }

    let position =
        reson8_db::channels::next_sibling_position(pool, server_id, request.parent_id).await?;
    let row = reson8_db::channels::create_channel(
        pool,
        snowflake::generate(),
        server_id,
        name,
        request.kind.as_str(),
        request.parent_id,
        position,
        request.max_users,
    )
    .await?;
    tracing::info!(channel_id = row.id, server_id, name, "channel created");
    Ok(row)
}

pub async fn update_channel(
    pool: &DbPool,
    user_id: &str,
    channel_id: i64,
    name: Option<&str>,
    max_users: Option<Option<i64>>,
) -> Result<ChannelRow, CoreError> {
    let channel = reson8_db::channels::get_channel(pool, channel_id)
        .await?
        .ok_or(CoreError::NotFound("channel"))?;
    let mask = permissions_for(pool, channel.server_id, user_id).await?;
    require_permission(mask, Permissions::MANAGE_CHANNELS)?;

    let name = name.map(str::trim);
    if let Some(name) = name {
        validation::validate_channel_name(name)
            .map_err(|e| CoreError::InvalidInput(format!("channel name: {e}")))?;
    }

    let row = reson8_db::channels::update_channel(pool, channel_id, name, max_users).await?;
    Ok(row)
}

/// Re-parent and/or re-position a channel. Rejects moves that would make the
/// channel an ancestor of itself.
pub async fn move_channel(
    pool: &DbPool,
    user_id: &str,
    channel_id: i64,
    new_parent: Option<i64>,
    position: Option<i64>,
) -> Result<ChannelRow, CoreError> {
    let channel = reson8_db::channels::get_channel(pool, channel_id)
        .await?
        .ok_or(CoreError::NotFound("channel"))?;
    let mask = permissions_for(pool, channel.server_id, user_id).await?;
    require_permission(mask, Permissions::MANAGE_CHANNELS)?;

    if let Some(parent_id) = new_parent {
        if parent_id == channel_id {
            return Err(CoreError::InvalidInput(
                "channel cannot be its own parent".to_string(),
            ));
        }
        let siblings = reson8_db::channels::get_server_channels(pool, channel.server_id).await?;
        if !siblings.iter().any(|row| row.id == parent_id) {
            return Err(CoreError::NotFound("parent channel"));
        }
        if would_create_cycle(&siblings, channel_id, parent_id) {
            return Err(CoreError::InvalidInput(
                "move would create a cycle in the channel tree".to_string(),
            ));
        }
    }

    let position = match position {
        Some(position) => position,
        None => {
            reson8_db::channels::next_sibling_position(pool, channel.server_id, new_parent).await?
        }
    };
    let row = reson8_db::channels::move_channel(pool, channel_id, new_parent, position).await?;
    tracing::info!(channel_id, ?new_parent, position, "channel moved");
    Ok(row)
}

pub async fn delete_channel(
    pool: &DbPool,
    user_id: &str,
    channel_id: i64,
) -> Result<ChannelRow, CoreError> {
    let channel = reson8_db::channels::get_channel(pool, channel_id)
        .await?
        .ok_or(CoreError::NotFound("channel"))?;
    let mask = permissions_for(pool, channel.server_id, user_id).await?;
    require_permission(mask, Permissions::MANAGE_CHANNELS)?;

    reson8_db::channels::delete_channel(pool, channel_id).await?;
    tracing::info!(channel_id, server_id = channel.server_id, "channel deleted");
    Ok(channel)
}

/// Walk the parent chain from `candidate_parent`; hitting `channel_id` means
/// the move would close a loop.
fn would_create_cycle(rows: &[ChannelRow], channel_id: i64, candidate_parent: i64) -> bool {
    let parent_of: std::collections::HashMap<i64, Option<i64>> =
        rows.iter().map(|row| (row.id, row.parent_id)).collect();

    let mut cursor = Some(candidate_parent);
    let mut hops = 0;
    while let Some(current) = cursor {
        if current == channel_id {
            return true;
        }
        hops += 1;
        if hops > rows.len() {
            return true;
        }
        cursor = parent_of.get(&current).copied().flatten();
    }
    false
}
