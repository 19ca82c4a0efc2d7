//! End-to-end handler flows against an in-memory stack: sqlite durable
//! store, in-process presence, room broker, and the memory SFU engine.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use reson8_core::presence::PresenceStore;
use reson8_core::rooms::RoomBroker;
use reson8_core::{AppConfig, AppState};
use reson8_gateway::handlers::{disconnect_cleanup, dispatch};
use reson8_gateway::session::Session;
use reson8_models::events::OutboundFrame;
use reson8_sfu::memory::MemoryEngine;
use reson8_sfu::{SfuCoordinator, WorkerPool, WorkerSettings};

async fn test_state(admin_instance_id: Option<&str>) -> AppState {
    let db = reson8_db::create_pool("sqlite::memory:", 1).await.unwrap();
    reson8_db::run_migrations(&db).await.unwrap();
    reson8_db::seed::seed_template(&db, "test", "", 64).await.unwrap();

    let engine = MemoryEngine::new();
    let pool = WorkerPool::spawn(&engine, 1, WorkerSettings::default(), Arc::new(|_| {}))
        .await
        .unwrap();

    AppState {
        db,
        presence: Arc::new(PresenceStore::default()),
        rooms: Arc::new(RoomBroker::new()),
        sfu: Arc::new(SfuCoordinator::new(pool)),
        config: AppConfig {
            turn: None,
            admin_instance_id: admin_instance_id.map(str::to_string),
        },
        started_at: Instant::now(),
    }
}

struct Client {
    session: Session,
    rx: UnboundedReceiver<OutboundFrame>,
}

fn connect(state: &AppState) -> Client {
    let session = Session::new();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    state.rooms.register(&session.connection_id, tx);
    Client { session, rx }
}

impl Client {
    fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn count(&mut self, event: &str) -> usize {
        self.drain().iter().filter(|f| f.event == event).count()
    }
}

async fn join_server(state: &AppState, client: &mut Client, user_id: &str, nickname: &str) {
    let ack = dispatch(
        state,
        &mut client.session,
        "USER_JOIN_SERVER",
        json!({ "userId": user_id, "nickname": nickname }),
    )
    .await
    .unwrap();
    assert!(ack["serverId"].is_string());
}

async fn channel_by_kind(state: &AppState, kind: &str) -> i64 {
    let server = reson8_db::servers::default_server(&state.db)
        .await
        .unwrap()
        .unwrap();
    reson8_db::channels::get_server_channels(&state.db, server.id)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.kind == kind)
        .unwrap()
        .id
}

async fn join_channel(state: &AppState, client: &mut Client, channel_id: i64) {
    dispatch(
        state,
        &mut client.session,
        "USER_JOIN_CHANNEL",
        json!({ "channelId": channel_id.to_string() }),
    )
    .await
    .unwrap();
}

/// Steps 1-4 of the voice handshake for a producing client; returns the
/// producer id from the PRODUCE ack.
async fn handshake_and_produce(state: &AppState, client: &mut Client, channel_id: i64) -> String {
    let caps = dispatch(
        state,
        &mut client.session,
        "GET_ROUTER_CAPABILITIES",
        json!({ "channelId": channel_id.to_string() }),
    )
    .await
    .unwrap();
    assert!(caps["rtpCapabilities"]["codecs"].is_array());

    let transport = dispatch(
        state,
        &mut client.session,
        "CREATE_WEBRTC_TRANSPORT",
        json!({ "channelId": channel_id.to_string(), "direction": "send" }),
    )
    .await
    .unwrap();
    let transport_id = transport["id"].as_str().unwrap().to_string();

    dispatch(
        state,
        &mut client.session,
        "CONNECT_TRANSPORT",
        json!({
            "transportId": transport_id,
            "dtlsParameters": transport["dtlsParameters"],
        }),
    )
    .await
    .unwrap();

    let produced = dispatch(
        state,
        &mut client.session,
        "PRODUCE",
        json!({
            "transportId": transport_id,
            "kind": "audio",
            "rtpParameters": { "codecs": [] },
        }),
    )
    .await
    .unwrap();
    produced["producerId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn join_emits_tree_to_caller_and_user_joined_to_others() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    let mut b = connect(&state);

    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    let a_frames = a.drain();
    assert_eq!(a_frames.len(), 1);
    assert_eq!(a_frames[0].event, "CHANNEL_TREE_UPDATE");
    assert!(a_frames[0].data["channels"].is_array());

    join_server(&state, &mut b, "install-bbbb", "Grace").await;
    let a_frames = a.drain();
    assert_eq!(a_frames.len(), 1);
    assert_eq!(a_frames[0].event, "USER_JOINED");
    assert_eq!(a_frames[0].data["userId"], "install-bbbb");
    // The joiner does not see their own USER_JOINED.
    assert_eq!(b.count("USER_JOINED"), 0);
}

#[tokio::test]
async fn events_before_join_are_rejected() {
    let state = test_state(None).await;
    let mut a = connect(&state);

    let err = dispatch(
        &state,
        &mut a.session,
        "SEND_MESSAGE",
        json!({ "channelId": "1", "content": "hi" }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.public_message(), "not authenticated");
}

#[tokio::test]
async fn member_cannot_create_channel_but_admin_instance_can() {
    let state = test_state(Some("install-zzzz")).await;
    let mut member = connect(&state);
    let mut admin = connect(&state);
    join_server(&state, &mut member, "install-aaaa", "Ada").await;
    join_server(&state, &mut admin, "install-zzzz", "Zoe").await;

    let err = dispatch(
        &state,
        &mut member.session,
        "CREATE_CHANNEL",
        json!({ "name": "plans", "type": "TEXT" }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.public_message(), "permission denied");

    let ack = dispatch(
        &state,
        &mut admin.session,
        "CREATE_CHANNEL",
        json!({ "name": "plans", "type": "TEXT" }),
    )
    .await
    .unwrap();
    assert!(ack["channelId"].is_string());

    // Both members of the server room see the created channel and new tree.
    let member_frames = member.drain();
    assert!(member_frames.iter().any(|f| f.event == "CHANNEL_CREATED"));
    assert!(member_frames.iter().any(|f| f.event == "CHANNEL_TREE_UPDATE"));
}

#[tokio::test]
async fn message_broadcasts_to_the_server_room() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    let mut b = connect(&state);
    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    join_server(&state, &mut b, "install-bbbb", "Grace").await;
    let text_channel = channel_by_kind(&state, "TEXT").await;
    a.drain();
    b.drain();

    dispatch(
        &state,
        &mut a.session,
        "SEND_MESSAGE",
        json!({ "channelId": text_channel.to_string(), "content": "  hello  " }),
    )
    .await
    .unwrap();

    // B is not in the channel but is in the server room.
    let b_frames = b.drain();
    let received: Vec<_> = b_frames
        .iter()
        .filter(|f| f.event == "MESSAGE_RECEIVED")
        .collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].data["content"], "hello");
    assert_eq!(received[0].data["nickname"], "Ada");
    // The sender receives it too (full-room semantics).
    assert_eq!(a.count("MESSAGE_RECEIVED"), 1);
}

#[tokio::test]
async fn voice_fan_out_delivers_one_new_producer_to_the_peer() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    let mut b = connect(&state);
    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    join_server(&state, &mut b, "install-bbbb", "Grace").await;
    let voice_channel = channel_by_kind(&state, "VOICE").await;
    join_channel(&state, &mut a, voice_channel).await;
    join_channel(&state, &mut b, voice_channel).await;
    a.drain();
    b.drain();

    let producer_id = handshake_and_produce(&state, &mut a, voice_channel).await;

    let b_frames = b.drain();
    let new_producers: Vec<_> = b_frames
        .iter()
        .filter(|f| f.event == "NEW_PRODUCER")
        .collect();
    assert_eq!(new_producers.len(), 1);
    assert_eq!(new_producers[0].data["producerId"], producer_id.as_str());
    assert_eq!(new_producers[0].data["userId"], "install-aaaa");
    assert_eq!(a.count("NEW_PRODUCER"), 0);

    // A disconnects mid-produce: B sees exactly one PRODUCER_CLOSED for it.
    disconnect_cleanup(&state, &mut a.session).await;
    let b_frames = b.drain();
    let closed: Vec<_> = b_frames
        .iter()
        .filter(|f| f.event == "PRODUCER_CLOSED")
        .collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].data["producerId"], producer_id.as_str());
    assert_eq!(closed[0].data["userId"], "install-aaaa");
}

#[tokio::test]
async fn disconnect_cleanup_order_is_producer_presence_user_left() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    let mut b = connect(&state);
    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    join_server(&state, &mut b, "install-bbbb", "Grace").await;
    let voice_channel = channel_by_kind(&state, "VOICE").await;
    join_channel(&state, &mut a, voice_channel).await;
    join_channel(&state, &mut b, voice_channel).await;
    handshake_and_produce(&state, &mut a, voice_channel).await;
    b.drain();

    disconnect_cleanup(&state, &mut a.session).await;

    let events: Vec<String> = b.drain().into_iter().map(|f| f.event).collect();
    assert_eq!(
        events,
        vec!["PRODUCER_CLOSED", "PRESENCE_UPDATE", "USER_LEFT"]
    );

    // The presence snapshot no longer shows A in the voice channel.
    let snapshot = state.presence.snapshot(a_server_id(&state).await);
    for channel in &snapshot.channels {
        assert!(channel.users.iter().all(|u| u.user_id != "install-aaaa"));
    }
}

async fn a_server_id(state: &AppState) -> i64 {
    reson8_db::servers::default_server(&state.db)
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn late_joiner_receives_existing_producers() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    let mut b = connect(&state);
    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    join_server(&state, &mut b, "install-bbbb", "Grace").await;
    let voice_channel = channel_by_kind(&state, "VOICE").await;
    join_channel(&state, &mut a, voice_channel).await;
    let producer_id = handshake_and_produce(&state, &mut a, voice_channel).await;

    join_channel(&state, &mut b, voice_channel).await;

    let b_frames = b.drain();
    let existing: Vec<_> = b_frames
        .iter()
        .filter(|f| f.event == "EXISTING_PRODUCERS")
        .collect();
    assert_eq!(existing.len(), 1);
    let producers = existing[0].data["producers"].as_array().unwrap();
    assert_eq!(producers.len(), 1);
    assert_eq!(producers[0]["producerId"], producer_id.as_str());
    assert_eq!(producers[0]["nickname"], "Ada");
}

#[tokio::test]
async fn channel_user_cap_is_enforced() {
    let state = test_state(Some("install-zzzz")).await;
    let mut admin = connect(&state);
    join_server(&state, &mut admin, "install-zzzz", "Zoe").await;

    let ack = dispatch(
        &state,
        &mut admin.session,
        "CREATE_CHANNEL",
        json!({ "name": "duo", "type": "VOICE", "maxUsers": 1 }),
    )
    .await
    .unwrap();
    let small: i64 = ack["channelId"].as_str().unwrap().parse().unwrap();

    join_channel(&state, &mut admin, small).await;

    let mut late = connect(&state);
    join_server(&state, &mut late, "install-bbbb", "Grace").await;
    let err = dispatch(
        &state,
        &mut late.session,
        "USER_JOIN_CHANNEL",
        json!({ "channelId": small.to_string() }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.public_message(), "channel is full");
}

#[tokio::test]
async fn moving_between_channels_updates_occupancy() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    let text_channel = channel_by_kind(&state, "TEXT").await;
    let voice_channel = channel_by_kind(&state, "VOICE").await;

    join_channel(&state, &mut a, text_channel).await;
    join_channel(&state, &mut a, voice_channel).await;

    assert!(state.presence.channel_users(text_channel).is_empty());
    assert_eq!(state.presence.channel_users(voice_channel).len(), 1);
    assert_eq!(
        state.presence.channel_of("install-aaaa"),
        Some(voice_channel)
    );
}

#[tokio::test]
async fn fetch_messages_pages_ascending() {
    let state = test_state(None).await;
    let mut a = connect(&state);
    join_server(&state, &mut a, "install-aaaa", "Ada").await;
    let text_channel = channel_by_kind(&state, "TEXT").await;

    for i in 0..5 {
        sqlx::query(
            "INSERT INTO messages (id, channel_id, user_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(9000 + i)
        .bind(text_channel)
        .bind("install-aaaa")
        .bind(format!("m{i}"))
        .bind(format!("2026-02-01T00:00:0{i}.000Z"))
        .execute(&state.db)
        .await
        .unwrap();
    }

    let ack = dispatch(
        &state,
        &mut a.session,
        "FETCH_MESSAGES",
        json!({ "channelId": text_channel.to_string(), "limit": 3 }),
    )
    .await
    .unwrap();
    let contents: Vec<&str> = ack["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m2", "m3", "m4"]);

    let before = ack["messages"][0]["createdAt"].as_str().unwrap().to_string();
    let older = dispatch(
        &state,
        &mut a.session,
        "FETCH_MESSAGES",
        json!({ "channelId": text_channel.to_string(), "before": before, "limit": 3 }),
    )
    .await
    .unwrap();
    let contents: Vec<&str> = older["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m0", "m1"]);
}

#[tokio::test]
async fn role_admin_flow_via_events() {
    let state = test_state(Some("install-zzzz")).await;
    let mut admin = connect(&state);
    let mut member = connect(&state);
    join_server(&state, &mut admin, "install-zzzz", "Zoe").await;
    join_server(&state, &mut member, "install-aaaa", "Ada").await;

    let roles = dispatch(&state, &mut admin.session, "GET_ROLES", Value::Null)
        .await
        .unwrap();
    let roles = roles["roles"].as_array().unwrap();
    assert_eq!(roles[0]["name"], "Admin");
    let admin_role_id = roles[0]["id"].as_str().unwrap().to_string();

    dispatch(
        &state,
        &mut admin.session,
        "ASSIGN_ROLE",
        json!({ "userId": "install-aaaa", "roleId": admin_role_id, "action": "add" }),
    )
    .await
    .unwrap();

    let users = dispatch(&state, &mut admin.session, "GET_ALL_USERS", Value::Null)
        .await
        .unwrap();
    let ada = users["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["userId"] == "install-aaaa")
        .unwrap();
    assert_eq!(ada["roles"].as_array().unwrap().len(), 2);

    // Members without MANAGE_ROLES cannot list.
    let err = dispatch(&state, &mut member.session, "GET_ROLES", Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "permission denied");
}
