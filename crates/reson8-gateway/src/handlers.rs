//! Inbound event dispatch: resolve identity, check permissions, call the
//! service, fan out the results. One entry point per connected session,
//! invoked strictly in arrival order by the session loop.

use serde::Serialize;
use serde_json::{json, Value};

use reson8_core::rooms::Room;
use reson8_core::{admin, channel as channel_service, message as message_service, AppState};
use reson8_db::channels::ChannelRow;
use reson8_db::messages::MessageRow;
use reson8_models::events::{self, OutboundFrame};
use reson8_models::permissions::Permissions;
use reson8_util::validation;

use crate::error::GatewayError;
use crate::session::Session;
use crate::voice;
use crate::wire::{self, parse_id, parse_payload};

pub async fn dispatch(
    state: &AppState,
    session: &mut Session,
    event: &str,
    data: Value,
) -> Result<Value, GatewayError> {
    match event {
        events::USER_JOIN_SERVER => join_server(state, session, data).await,
        events::USER_LEAVE_SERVER => leave_server(state, session).await,
        events::USER_JOIN_CHANNEL => join_channel(state, session, data).await,
        events::USER_LEAVE_CHANNEL => leave_channel(state, session).await,
        events::CREATE_CHANNEL => create_channel(state, session, data).await,
        events::UPDATE_CHANNEL => update_channel(state, session, data).await,
        events::CHANNEL_MOVED => move_channel(state, session, data).await,
        events::DELETE_CHANNEL => delete_channel(state, session, data).await,
        events::SEND_MESSAGE => send_message(state, session, data).await,
        events::FETCH_MESSAGES => fetch_messages(state, session, data).await,
        events::GET_ALL_USERS => get_all_users(state, session).await,
        events::GET_ROLES => get_roles(state, session).await,
        events::ASSIGN_ROLE => assign_role(state, session, data).await,
        events::GET_ROUTER_CAPABILITIES
        | events::CREATE_WEBRTC_TRANSPORT
        | events::CONNECT_TRANSPORT
        | events::PRODUCE
        | events::CONSUME
        | events::RESUME_CONSUMER
        | events::CLOSE_PRODUCER => voice::dispatch(state, session, event, data).await,
        _ => Err(GatewayError::InvalidInput(format!(
            "unknown event '{event}'"
        ))),
    }
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::Backend(e.to_string()))
}

pub(crate) async fn require_flag(
    state: &AppState,
    server_id: i64,
    user_id: &str,
    flag: Permissions,
) -> Result<(), GatewayError> {
    let mask = reson8_core::permissions::permissions_for(&state.db, server_id, user_id).await?;
    reson8_core::permissions::require_permission(mask, flag)?;
    Ok(())
}

fn channel_payload(row: &ChannelRow) -> Value {
    json!({
        "id": row.id.to_string(),
        "serverId": row.server_id.to_string(),
        "name": row.name,
        "type": row.kind,
        "parentId": row.parent_id.map(|id| id.to_string()),
        "position": row.position,
        "maxUsers": row.max_users,
        "createdAt": row.created_at,
    })
}

fn message_payload(row: &MessageRow, nickname: &str) -> Value {
    json!({
        "id": row.id.to_string(),
        "channelId": row.channel_id.to_string(),
        "userId": row.user_id,
        "nickname": nickname,
        "content": row.content,
        "createdAt": row.created_at,
    })
}

/// Rebuild the server's tree and broadcast it to the whole server room.
async fn broadcast_tree(state: &AppState, server_id: i64) -> Result<(), GatewayError> {
    let tree =
        reson8_core::tree::tree_with_occupants(&state.db, &state.presence, server_id).await?;
    state.rooms.emit(
        Room::Server(server_id),
        OutboundFrame::new(
            events::CHANNEL_TREE_UPDATE,
            json!({
                "serverId": server_id.to_string(),
                "channels": to_value(&tree)?,
            }),
        ),
    );
    Ok(())
}

fn broadcast_presence(state: &AppState, server_id: i64) -> Result<(), GatewayError> {
    let snapshot = state.presence.snapshot(server_id);
    state.rooms.emit(
        Room::Server(server_id),
        OutboundFrame::new(events::PRESENCE_UPDATE, to_value(&snapshot)?),
    );
    Ok(())
}

async fn join_server(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    if session.server_id.is_some() {
        return Err(GatewayError::PreconditionFailed(
            "already joined a server".to_string(),
        ));
    }
    let payload: wire::JoinServer = parse_payload(data)?;
    validation::validate_installation_id(&payload.user_id)
        .map_err(|e| GatewayError::InvalidInput(format!("user id: {e}")))?;
    validation::validate_nickname(&payload.nickname)
        .map_err(|e| GatewayError::InvalidInput(format!("nickname: {e}")))?;

    let server = match &payload.server_id {
        Some(raw) => reson8_db::servers::get_server(&state.db, parse_id(raw, "server")?).await?,
        None => reson8_db::servers::default_server(&state.db).await?,
    }
    .ok_or_else(|| GatewayError::NotFound("server".to_string()))?;

    let online = state.presence.server_users(server.id).len() as i64;
    if online >= server.max_clients {
        return Err(GatewayError::PreconditionFailed("server is full".to_string()));
    }

    let user = reson8_db::users::upsert_user(&state.db, &payload.user_id, &payload.nickname).await?;
    reson8_db::seed::ensure_member_role(&state.db, server.id, &user.id).await?;
    if state.config.admin_instance_id.as_deref() == Some(user.id.as_str()) {
        reson8_db::seed::ensure_admin_role(&state.db, server.id, &user.id).await?;
        tracing::info!(user_id = %user.id, "admin instance joined, admin role ensured");
    }

    state
        .presence
        .join_server(&user.id, server.id, &user.nickname);
    state
        .rooms
        .join(Room::Server(server.id), &session.connection_id);

    session.user_id = Some(user.id.clone());
    session.nickname = user.nickname.clone();
    session.server_id = Some(server.id);

    // Initial tree goes to the caller only; the join itself to everyone else.
    let tree =
        reson8_core::tree::tree_with_occupants(&state.db, &state.presence, server.id).await?;
    state.rooms.send_to(
        &session.connection_id,
        OutboundFrame::new(
            events::CHANNEL_TREE_UPDATE,
            json!({
                "serverId": server.id.to_string(),
                "channels": to_value(&tree)?,
            }),
        ),
    );
    state.rooms.emit_except(
        Room::Server(server.id),
        &session.connection_id,
        OutboundFrame::new(
            events::USER_JOINED,
            json!({
                "userId": user.id,
                "nickname": user.nickname,
            }),
        ),
    );

    tracing::info!(user_id = %user.id, server_id = server.id, "user joined server");
    Ok(json!({ "serverId": server.id.to_string() }))
}

async fn leave_server(state: &AppState, session: &mut Session) -> Result<Value, GatewayError> {
    session.identity()?;
    do_leave_server(state, session).await;
    Ok(json!({}))
}

/// Shared by USER_LEAVE_SERVER and disconnect. Step failures are logged and
/// do not stop the remaining steps.
pub async fn do_leave_server(state: &AppState, session: &mut Session) {
    let Some(server_id) = session.server_id else {
        return;
    };
    let Some(user_id) = session.user_id.clone() else {
        return;
    };

    if session.channel_id.is_some() {
        if let Err(err) = leave_current_channel(state, session).await {
            tracing::error!(error = %err, user_id = %user_id, "channel cleanup failed during leave");
        }
    }

    state.presence.leave_server(&user_id, server_id);
    state
        .rooms
        .leave(Room::Server(server_id), &session.connection_id);
    state.rooms.emit(
        Room::Server(server_id),
        OutboundFrame::new(events::USER_LEFT, json!({ "userId": user_id })),
    );

    session.user_id = None;
    session.server_id = None;
    session.nickname.clear();
    tracing::info!(user_id = %user_id, server_id, "user left server");
}

/// Tear down the session's current channel: SFU session first (broadcasting
/// PRODUCER_CLOSED if one existed), then presence, then the occupancy
/// broadcast.
async fn leave_current_channel(
    state: &AppState,
    session: &mut Session,
) -> Result<(), GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let user_id = user_id.to_string();
    let Some(channel_id) = session.channel_id.take() else {
        return Ok(());
    };

    if let Some(closed) = state.sfu.cleanup_session(channel_id, &user_id).await {
        state.rooms.emit_except(
            Room::Channel(channel_id),
            &session.connection_id,
            OutboundFrame::new(
                events::PRODUCER_CLOSED,
                json!({
                    "producerId": closed.producer_id,
                    "userId": closed.user_id,
                    "channelId": channel_id.to_string(),
                }),
            ),
        );
    }

    state
        .rooms
        .leave(Room::Channel(channel_id), &session.connection_id);
    state.presence.leave_channel(&user_id);
    broadcast_presence(state, server_id)?;
    Ok(())
}

async fn join_channel(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let user_id = user_id.to_string();
    let payload: wire::JoinChannel = parse_payload(data)?;
    let channel_id = parse_id(&payload.channel_id, "channel")?;

    let channel = reson8_db::channels::get_channel(&state.db, channel_id)
        .await?
        .filter(|row| row.server_id == server_id)
        .ok_or_else(|| GatewayError::NotFound("channel".to_string()))?;

    if channel.kind == "VOICE" {
        require_flag(state, server_id, &user_id, Permissions::CONNECT).await?;
    }
    if let Some(max_users) = channel.max_users {
        let occupancy = state.presence.channel_users(channel_id).len() as i64;
        if occupancy >= max_users {
            return Err(GatewayError::PreconditionFailed(
                "channel is full".to_string(),
            ));
        }
    }

    if session.channel_id.is_some() {
        leave_current_channel(state, session).await?;
    }

    if !state.presence.join_channel(&user_id, channel_id) {
        return Err(GatewayError::NotAuthenticated);
    }
    state
        .rooms
        .join(Room::Channel(channel_id), &session.connection_id);
    session.channel_id = Some(channel_id);

    broadcast_presence(state, server_id)?;

    let existing = state.sfu.existing_producers(channel_id, &user_id).await;
    state.rooms.send_to(
        &session.connection_id,
        OutboundFrame::new(
            events::EXISTING_PRODUCERS,
            json!({
                "channelId": channel_id.to_string(),
                "producers": to_value(&existing)?,
            }),
        ),
    );

    tracing::debug!(user_id = %user_id, channel_id, "user joined channel");
    Ok(json!({ "channelId": channel_id.to_string() }))
}

async fn leave_channel(state: &AppState, session: &mut Session) -> Result<Value, GatewayError> {
    session.identity()?;
    if session.channel_id.is_none() {
        return Err(GatewayError::PreconditionFailed(
            "not in a channel".to_string(),
        ));
    }
    leave_current_channel(state, session).await?;
    Ok(json!({}))
}

async fn create_channel(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let payload: wire::CreateChannel = parse_payload(data)?;
    let parent_id = payload
        .parent_id
        .as_deref()
        .map(|raw| parse_id(raw, "parent channel"))
        .transpose()?;

    let row = channel_service::create_channel(
        &state.db,
        server_id,
        user_id,
        channel_service::CreateChannel {
            name: &payload.name,
            kind: payload.kind,
            parent_id,
            max_users: payload.max_users,
        },
    )
    .await?;

    state.rooms.emit(
        Room::Server(server_id),
        OutboundFrame::new(events::CHANNEL_CREATED, channel_payload(&row)),
    );
    broadcast_tree(state, server_id).await?;
    Ok(json!({ "channelId": row.id.to_string() }))
}

async fn update_channel(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let payload: wire::UpdateChannel = parse_payload(data)?;
    let channel_id = parse_id(&payload.channel_id, "channel")?;

    channel_service::update_channel(
        &state.db,
        user_id,
        channel_id,
        payload.name.as_deref(),
        payload.max_users,
    )
    .await?;
    broadcast_tree(state, server_id).await?;
    Ok(json!({}))
}

async fn move_channel(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let payload: wire::MoveChannel = parse_payload(data)?;
    let channel_id = parse_id(&payload.channel_id, "channel")?;
    let parent_id = payload
        .parent_id
        .as_deref()
        .map(|raw| parse_id(raw, "parent channel"))
        .transpose()?;

    channel_service::move_channel(&state.db, user_id, channel_id, parent_id, payload.position)
        .await?;
    broadcast_tree(state, server_id).await?;
    Ok(json!({}))
}

async fn delete_channel(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let payload: wire::DeleteChannel = parse_payload(data)?;
    let channel_id = parse_id(&payload.channel_id, "channel")?;

    channel_service::delete_channel(&state.db, user_id, channel_id).await?;

    broadcast_tree(state, server_id).await?;
    state.rooms.emit(
        Room::Server(server_id),
        OutboundFrame::new(
            events::CHANNEL_DELETED,
            json!({ "channelId": channel_id.to_string() }),
        ),
    );
    Ok(json!({}))
}

async fn send_message(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let payload: wire::SendMessage = parse_payload(data)?;
    let channel_id = parse_id(&payload.channel_id, "channel")?;

    let row =
        message_service::send_message(&state.db, server_id, user_id, channel_id, &payload.content)
            .await?;

    // The whole server room: clients render channels they are not "in".
    let frame = OutboundFrame::new(
        events::MESSAGE_RECEIVED,
        message_payload(&row, &session.nickname),
    );
    state.rooms.emit(Room::Server(server_id), frame);
    Ok(json!({ "message": message_payload(&row, &session.nickname) }))
}

async fn fetch_messages(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    session.identity()?;
    let payload: wire::FetchMessages = parse_payload(data)?;
    let channel_id = parse_id(&payload.channel_id, "channel")?;

    let rows = message_service::fetch_messages(
        &state.db,
        channel_id,
        payload.before.as_deref(),
        payload.limit,
    )
    .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in &rows {
        let nickname = reson8_db::users::get_user(&state.db, &row.user_id)
            .await?
            .map(|user| user.nickname)
            .unwrap_or_default();
        messages.push(message_payload(row, &nickname));
    }
    Ok(json!({ "messages": messages }))
}

async fn get_all_users(state: &AppState, session: &mut Session) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let users = admin::list_role_holders(&state.db, server_id, user_id).await?;
    Ok(json!({ "users": to_value(&users)? }))
}

async fn get_roles(state: &AppState, session: &mut Session) -> Result<Value, GatewayError> {
    let (user_id, server_id) = session.identity()?;
    let roles = admin::list_roles(&state.db, server_id, user_id).await?;
    Ok(json!({ "roles": to_value(&roles)? }))
}

async fn assign_role(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let (actor_id, server_id) = session.identity()?;
    let payload: wire::AssignRole = parse_payload(data)?;
    let role_id = parse_id(&payload.role_id, "role")?;

    admin::assign_role(
        &state.db,
        server_id,
        actor_id,
        &payload.user_id,
        role_id,
        payload.action,
    )
    .await?;
    Ok(json!({}))
}

/// Disconnect cleanup, in the mandated order: SFU session (PRODUCER_CLOSED),
/// channel presence (PRESENCE_UPDATE), server presence, USER_LEFT.
pub async fn disconnect_cleanup(state: &AppState, session: &mut Session) {
    do_leave_server(state, session).await;
}
