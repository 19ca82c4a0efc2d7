use serde::{Deserialize, Serialize};

/// A user visible in a channel or server listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupant {
    pub user_id: String,
    pub nickname: String,
}

/// Per-channel occupancy inside a PRESENCE_UPDATE snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOccupancy {
    pub channel_id: String,
    pub users: Vec<Occupant>,
}

/// Payload of PRESENCE_UPDATE: the full occupancy snapshot for one server.
/// A snapshot rather than a delta, so a receiver can always replace its view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub server_id: String,
    pub channels: Vec<ChannelOccupancy>,
}
