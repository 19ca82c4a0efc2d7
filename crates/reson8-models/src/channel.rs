use serde::{Deserialize, Serialize};

use crate::presence::Occupant;

/// What a channel carries. Any channel may hold children regardless of kind;
/// there is no separate category variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "VOICE")]
    Voice,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Voice => "VOICE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TEXT" => Some(Self::Text),
            "VOICE" => Some(Self::Voice),
            _ => None,
        }
    }
}

/// One node of the channel tree as emitted to clients. Ids are decimal
/// strings on the wire. `occupants` is filled from presence at emit time,
/// never by the tree builder.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelNode {
    pub id: String,
    pub server_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub parent_id: Option<String>,
    pub position: i64,
    pub max_users: Option<i64>,
    pub created_at: String,
    pub children: Vec<ChannelNode>,
    pub occupants: Vec<Occupant>,
}
