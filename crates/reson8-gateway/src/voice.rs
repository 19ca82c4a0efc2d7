//! The six-step voice handshake plus producer teardown. Every event here
//! requires an authenticated session currently in a voice channel; CONNECT
//! gates the receive path, SPEAK gates the produce path.

use serde_json::{json, Value};

use reson8_core::rooms::Room;
use reson8_core::AppState;
use reson8_models::events::{self, OutboundFrame};
use reson8_models::permissions::Permissions;

use crate::error::GatewayError;
use crate::handlers::{require_flag, to_value};
use crate::session::Session;
use crate::wire::{self, parse_id, parse_payload};

pub async fn dispatch(
    state: &AppState,
    session: &mut Session,
    event: &str,
    data: Value,
) -> Result<Value, GatewayError> {
    match event {
        events::GET_ROUTER_CAPABILITIES => router_capabilities(state, session, data).await,
        events::CREATE_WEBRTC_TRANSPORT => create_transport(state, session, data).await,
        events::CONNECT_TRANSPORT => connect_transport(state, session, data).await,
        events::PRODUCE => produce(state, session, data).await,
        events::CONSUME => consume(state, session, data).await,
        events::RESUME_CONSUMER => resume_consumer(state, session, data).await,
        events::CLOSE_PRODUCER => close_producer(state, session, data).await,
        _ => Err(GatewayError::InvalidInput(format!(
            "unknown voice event '{event}'"
        ))),
    }
}

/// The channel named in the payload must be the channel the session is in.
fn expect_current_channel(session: &Session, raw: &str) -> Result<i64, GatewayError> {
    let requested = parse_id(raw, "channel")?;
    let (_, _, current) = session.voice_context()?;
    if requested != current {
        return Err(GatewayError::PreconditionFailed(
            "not in that voice channel".to_string(),
        ));
    }
    Ok(current)
}

async fn router_capabilities(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::GetRouterCapabilities = parse_payload(data)?;
    let channel_id = expect_current_channel(session, &payload.channel_id)?;
    let (user_id, server_id, _) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::CONNECT).await?;

    let capabilities = state.sfu.router_capabilities(channel_id).await?;
    Ok(json!({ "rtpCapabilities": to_value(&capabilities)? }))
}

async fn create_transport(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::CreateWebrtcTransport = parse_payload(data)?;
    let channel_id = expect_current_channel(session, &payload.channel_id)?;
    let (user_id, server_id, _) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::CONNECT).await?;

    let descriptor = state
        .sfu
        .create_transport(channel_id, user_id, payload.direction)
        .await?;

    let mut ack = to_value(&descriptor)?;
    if let Some(turn) = &state.config.turn {
        ack["turn"] = to_value(turn)?;
    }
    Ok(ack)
}

async fn connect_transport(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::ConnectTransport = parse_payload(data)?;
    let (user_id, server_id, channel_id) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::CONNECT).await?;

    state
        .sfu
        .connect_transport(channel_id, user_id, &payload.transport_id, payload.dtls_parameters)
        .await?;
    Ok(json!({}))
}

async fn produce(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::Produce = parse_payload(data)?;
    let (user_id, server_id, channel_id) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::SPEAK).await?;

    let producer_id = state
        .sfu
        .produce(
            channel_id,
            user_id,
            &session.nickname,
            &payload.transport_id,
            payload.kind,
            payload.rtp_parameters,
        )
        .await?;

    state.rooms.emit_except(
        Room::Channel(channel_id),
        &session.connection_id,
        OutboundFrame::new(
            events::NEW_PRODUCER,
            json!({
                "producerId": producer_id,
                "userId": user_id,
                "nickname": session.nickname,
                "channelId": channel_id.to_string(),
            }),
        ),
    );
    Ok(json!({ "producerId": producer_id }))
}

async fn consume(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::Consume = parse_payload(data)?;
    let (user_id, server_id, channel_id) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::CONNECT).await?;

    let descriptor = state
        .sfu
        .consume(
            channel_id,
            user_id,
            &payload.producer_id,
            payload.rtp_capabilities,
        )
        .await?;
    to_value(&descriptor)
}

async fn resume_consumer(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::ResumeConsumer = parse_payload(data)?;
    let (user_id, server_id, channel_id) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::CONNECT).await?;

    state
        .sfu
        .resume_consumer(channel_id, user_id, &payload.consumer_id)
        .await?;
    Ok(json!({}))
}

async fn close_producer(
    state: &AppState,
    session: &mut Session,
    data: Value,
) -> Result<Value, GatewayError> {
    let payload: wire::CloseProducer = parse_payload(data)?;
    let (user_id, server_id, channel_id) = session.voice_context()?;
    require_flag(state, server_id, user_id, Permissions::SPEAK).await?;

    let closed = state
        .sfu
        .close_producer(channel_id, user_id, &payload.producer_id)
        .await?;

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
    Ok(json!({}))
}
