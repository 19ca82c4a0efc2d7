//! Per-connection actor loop: inbound events are handled strictly in
//! arrival order; outbound fan-out drains from the broker queue; a ping
//! every ten seconds with a short grace detects dead peers.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use reson8_core::AppState;
use reson8_models::events::{self, OutboundFrame};

use crate::handlers;
use crate::session::Session;
use crate::wire::InboundFrame;

const PING_INTERVAL: Duration = Duration::from_secs(10);
const PONG_GRACE: Duration = Duration::from_secs(5);

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::new();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
    state.rooms.register(&session.connection_id, outbound_tx);
    tracing::debug!(connection_id = %session.connection_id, "connection opened");

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_heard = Instant::now();

    let disconnect_reason = loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_heard = Instant::now();
                        if handle_frame(&state, &mut session, &mut sender, &text).await.is_err() {
                            break "websocket send error";
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_heard = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) => break "client close frame",
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break "websocket receive error",
                    None => break "websocket stream ended",
                }
            }
            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break "websocket send error";
                        }
                    }
                    None => break "outbound queue closed",
                }
            }
            _ = ping_interval.tick() => {
                if last_heard.elapsed() > PING_INTERVAL + PONG_GRACE {
                    break "ping timeout";
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error";
                }
            }
        }
    };

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = ?session.user_id,
        reason = disconnect_reason,
        "connection closed"
    );

    // In-flight work has finished (events run in order on this task); now
    // release everything the session held.
    handlers::disconnect_cleanup(&state, &mut session).await;
    state.rooms.unregister(&session.connection_id);
}

async fn send_frame(
    sender: &mut (impl SinkExt<Message> + Unpin),
    frame: &OutboundFrame,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, event = %frame.event, "failed to serialize frame");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

/// Parse one inbound frame, dispatch it, and answer: an ACK when the client
/// asked for one, an ERROR push when it did not and the handler failed.
async fn handle_frame(
    state: &AppState,
    session: &mut Session,
    sender: &mut (impl SinkExt<Message> + Unpin),
    text: &str,
) -> Result<(), ()> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(
                connection_id = %session.connection_id,
                error = %err,
                "unparseable frame"
            );
            return send_frame(
                sender,
                &OutboundFrame::new(events::ERROR, json!({ "error": "malformed frame" })),
            )
            .await;
        }
    };

    let result = handlers::dispatch(state, session, &frame.event, frame.data).await;
    match (frame.seq, result) {
        (Some(seq), Ok(mut data)) => {
            if let Some(object) = data.as_object_mut() {
                object.insert("success".to_string(), json!(true));
            }
            send_frame(sender, &OutboundFrame::ack(seq, data)).await
        }
        (Some(seq), Err(err)) => {
            log_handler_error(session, &frame.event, &err);
            send_frame(
                sender,
                &OutboundFrame::ack(
                    seq,
                    json!({ "success": false, "error": err.public_message() }),
                ),
            )
            .await
        }
        (None, Ok(_)) => Ok(()),
        (None, Err(err)) => {
            log_handler_error(session, &frame.event, &err);
            send_frame(
                sender,
                &OutboundFrame::new(events::ERROR, json!({ "error": err.public_message() })),
            )
            .await
        }
    }
}

fn log_handler_error(session: &Session, event: &str, err: &crate::GatewayError) {
    tracing::error!(
        connection_id = %session.connection_id,
        user_id = ?session.user_id,
        event,
        error = %err,
        detail = ?err.internal_detail(),
        "event handler failed"
    );
}
