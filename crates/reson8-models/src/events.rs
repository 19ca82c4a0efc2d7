use serde::Serialize;
use serde_json::Value;

// Inbound event names.
pub const USER_JOIN_SERVER: &str = "USER_JOIN_SERVER";
pub const USER_LEAVE_SERVER: &str = "USER_LEAVE_SERVER";
pub const USER_JOIN_CHANNEL: &str = "USER_JOIN_CHANNEL";
pub const USER_LEAVE_CHANNEL: &str = "USER_LEAVE_CHANNEL";
pub const CHANNEL_MOVED: &str = "CHANNEL_MOVED";
pub const CREATE_CHANNEL: &str = "CREATE_CHANNEL";
pub const DELETE_CHANNEL: &str = "DELETE_CHANNEL";
pub const UPDATE_CHANNEL: &str = "UPDATE_CHANNEL";
pub const SEND_MESSAGE: &str = "SEND_MESSAGE";
pub const FETCH_MESSAGES: &str = "FETCH_MESSAGES";
pub const GET_ALL_USERS: &str = "GET_ALL_USERS";
pub const GET_ROLES: &str = "GET_ROLES";
pub const ASSIGN_ROLE: &str = "ASSIGN_ROLE";
pub const GET_ROUTER_CAPABILITIES: &str = "GET_ROUTER_CAPABILITIES";
pub const CREATE_WEBRTC_TRANSPORT: &str = "CREATE_WEBRTC_TRANSPORT";
pub const CONNECT_TRANSPORT: &str = "CONNECT_TRANSPORT";
pub const PRODUCE: &str = "PRODUCE";
pub const CONSUME: &str = "CONSUME";
pub const RESUME_CONSUMER: &str = "RESUME_CONSUMER";
pub const CLOSE_PRODUCER: &str = "CLOSE_PRODUCER";

// Outbound event names.
pub const ACK: &str = "ACK";
pub const USER_JOINED: &str = "USER_JOINED";
pub const USER_LEFT: &str = "USER_LEFT";
pub const CHANNEL_TREE_UPDATE: &str = "CHANNEL_TREE_UPDATE";
pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
pub const MESSAGE_RECEIVED: &str = "MESSAGE_RECEIVED";
pub const CHANNEL_CREATED: &str = "CHANNEL_CREATED";
pub const CHANNEL_DELETED: &str = "CHANNEL_DELETED";
pub const ERROR: &str = "ERROR";
pub const NEW_PRODUCER: &str = "NEW_PRODUCER";
pub const PRODUCER_CLOSED: &str = "PRODUCER_CLOSED";
pub const EXISTING_PRODUCERS: &str = "EXISTING_PRODUCERS";

/// One server-to-client frame: `{"event": ..., "seq"?: ..., "data": ...}`.
/// `seq` is set only on ACK frames and echoes the client's request sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub data: Value,
}

impl OutboundFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            seq: None,
            data,
        }
    }

    pub fn ack(seq: u64, data: Value) -> Self {
        Self {
            event: ACK.to_string(),
            seq: Some(seq),
            data,
        }
    }
}
