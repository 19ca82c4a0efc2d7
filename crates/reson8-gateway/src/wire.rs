//! Wire payloads for inbound events. Every frame is
//! `{"event": NAME, "seq"?: n, "data": {...}}`; ids travel as decimal
//! strings and are parsed here.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use reson8_models::channel::ChannelKind;
use reson8_sfu::{DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection};

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default)]
    pub data: Value,
}

pub fn parse_payload<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, GatewayError> {
    serde_json::from_value(data).map_err(|e| GatewayError::InvalidInput(format!("bad payload: {e}")))
}

pub fn parse_id(raw: &str, what: &str) -> Result<i64, GatewayError> {
    raw.parse::<i64>()
        .map_err(|_| GatewayError::InvalidInput(format!("invalid {what} id")))
}

/// Distinguishes an absent key from an explicit null, for fields where null
/// means "clear".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinServer {
    #[serde(default)]
    pub server_id: Option<String>,
    pub user_id: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChannel {
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub max_users: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChannel {
    pub channel_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_users: Option<Option<i64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveChannel {
    pub channel_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChannel {
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub channel_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMessages {
    pub channel_id: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRole {
    pub user_id: String,
    pub role_id: String,
    pub action: reson8_core::admin::RoleAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRouterCapabilities {
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebrtcTransport {
    pub channel_id: String,
    pub direction: TransportDirection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransport {
    pub transport_id: String,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Produce {
    pub transport_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consume {
    pub producer_id: String,
    #[serde(default)]
    pub rtp_capabilities: Option<RtpCapabilities>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeConsumer {
    pub consumer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseProducer {
    pub producer_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_parse_with_and_without_seq() {
        let with_seq: InboundFrame =
            serde_json::from_value(json!({"event": "SEND_MESSAGE", "seq": 3, "data": {}})).unwrap();
        assert_eq!(with_seq.seq, Some(3));

        let without: InboundFrame =
            serde_json::from_value(json!({"event": "USER_LEAVE_SERVER"})).unwrap();
        assert_eq!(without.seq, None);
        assert!(without.data.is_null());
    }

    #[test]
    fn update_channel_distinguishes_null_from_absent() {
        let absent: UpdateChannel =
            serde_json::from_value(json!({"channelId": "1"})).unwrap();
        assert_eq!(absent.max_users, None);

        let cleared: UpdateChannel =
            serde_json::from_value(json!({"channelId": "1", "maxUsers": null})).unwrap();
        assert_eq!(cleared.max_users, Some(None));

        let set: UpdateChannel =
            serde_json::from_value(json!({"channelId": "1", "maxUsers": 5})).unwrap();
        assert_eq!(set.max_users, Some(Some(5)));
    }

    #[test]
    fn ids_must_be_decimal_strings() {
        assert!(parse_id("123", "channel").is_ok());
        assert!(parse_id("abc", "channel").is_err());
    }
}
