//! The narrow seam between the signaling server and the media engine.
//!
//! The coordinator drives workers, routers, transports, producers and
//! consumers exclusively through these traits; the engine behind them owns
//! RTP forwarding and is free to live in another process entirely.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SfuError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Precondition(String),
    #[error("sfu engine failure: {0}")]
    Engine(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub mime_type: String,
    pub kind: MediaKind,
    pub clock_rate: u32,
    pub channels: u32,
    pub preferred_payload_type: u8,
}

/// What a router can route. Clients send back the subset they support when
/// consuming; matching is by mime type and clock rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    pub codecs: Vec<RtpCodecCapability>,
}

impl RtpCapabilities {
    pub fn supports(&self, codec: &RtpCodecCapability) -> bool {
        self.codecs.iter().any(|c| {
            c.mime_type.eq_ignore_ascii_case(&codec.mime_type) && c.clock_rate == codec.clock_rate
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    pub mime_type: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    pub codecs: Vec<RtpCodecParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(rename = "type")]
    pub candidate_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtlsParameters {
    pub role: String,
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Startup settings handed to every worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Public IP advertised in ICE candidates.
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 49999,
        }
    }
}

pub type DiedHook = Box<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait SfuEngine: Send + Sync {
    async fn spawn_worker(&self, settings: WorkerSettings) -> Result<Arc<dyn SfuWorker>, SfuError>;
}

#[async_trait]
pub trait SfuWorker: Send + Sync {
    fn id(&self) -> String;
    async fn create_router(&self) -> Result<Arc<dyn SfuRouter>, SfuError>;
    /// Register a hook invoked with the worker id if the worker dies.
    fn on_died(&self, hook: DiedHook);
}

#[async_trait]
pub trait SfuRouter: Send + Sync {
    fn id(&self) -> String;
    fn rtp_capabilities(&self) -> RtpCapabilities;
    async fn create_transport(&self) -> Result<Arc<dyn SfuTransport>, SfuError>;
    /// Whether a consumer with `capabilities` can receive `producer_id`.
    fn can_consume(&self, producer_id: &str, capabilities: &RtpCapabilities) -> bool;
    async fn close(&self);
}

#[async_trait]
pub trait SfuTransport: Send + Sync {
    fn id(&self) -> String;
    fn ice_parameters(&self) -> IceParameters;
    fn ice_candidates(&self) -> Vec<IceCandidate>;
    fn dtls_parameters(&self) -> DtlsParameters;
    async fn connect(&self, dtls: DtlsParameters) -> Result<(), SfuError>;
    async fn produce(
        &self,
        kind: MediaKind,
        rtp: RtpParameters,
    ) -> Result<Arc<dyn SfuProducer>, SfuError>;
    async fn consume(
        &self,
        producer_id: &str,
        capabilities: &RtpCapabilities,
    ) -> Result<Arc<dyn SfuConsumer>, SfuError>;
    async fn close(&self);
}

#[async_trait]
pub trait SfuProducer: Send + Sync + std::fmt::Debug {
    fn id(&self) -> String;
    fn kind(&self) -> MediaKind;
    async fn close(&self);
}

#[async_trait]
pub trait SfuConsumer: Send + Sync {
    fn id(&self) -> String;
    fn producer_id(&self) -> String;
    fn kind(&self) -> MediaKind;
    fn rtp_parameters(&self) -> RtpParameters;
    fn paused(&self) -> bool;
    async fn resume(&self) -> Result<(), SfuError>;
    async fn close(&self);
}
