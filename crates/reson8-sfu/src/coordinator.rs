//! Per-channel voice bookkeeping: routers, transports, producers, consumers.
//!
//! A router exists from the first voice event for a channel until the last
//! voice session leaves. Voice sessions are keyed by `(channel, user)` and
//! owned exclusively by the session that created them; all cross-session
//! effects (consumer teardown when a producer closes) happen here, under the
//! coordinator's lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::engine::{
    DtlsParameters, IceCandidate, IceParameters, MediaKind, RtpCapabilities, RtpParameters,
    SfuConsumer, SfuError, SfuProducer, SfuRouter, SfuTransport,
};
use crate::pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: String,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// A producer together with its owning user; recorded at produce time so
/// every PRODUCER_CLOSED can carry both ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub user_id: String,
    pub nickname: String,
    pub producer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedProducer {
    pub producer_id: String,
    pub user_id: String,
}

#[derive(Default)]
struct VoiceSession {
    send_transport: Option<Arc<dyn SfuTransport>>,
    recv_transport: Option<Arc<dyn SfuTransport>>,
    producer: Option<Arc<dyn SfuProducer>>,
    consumers: HashMap<String, Arc<dyn SfuConsumer>>,
}

struct ChannelVoice {
    router: Arc<dyn SfuRouter>,
    sessions: HashMap<String, VoiceSession>,
    producer_owners: HashMap<String, ProducerInfo>,
}

pub struct SfuCoordinator {
    pool: WorkerPool,
    channels: Mutex<HashMap<i64, ChannelVoice>>,
}

impl SfuCoordinator {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            channels: Mutex::new(HashMap::new()),
        }
    }

    async fn ensure_channel<'a>(
        &self,
        channels: &'a mut HashMap<i64, ChannelVoice>,
        channel_id: i64,
    ) -> Result<&'a mut ChannelVoice, SfuError> {
        if !channels.contains_key(&channel_id) {
            let router = self.pool.next_worker().create_router().await?;
            tracing::info!(channel_id, router_id = %router.id(), "voice router created");
            channels.insert(
                channel_id,
                ChannelVoice {
                    router,
                    sessions: HashMap::new(),
                    producer_owners: HashMap::new(),
                },
            );
        }
        Ok(channels.get_mut(&channel_id).unwrap())
    }

    pub async fn router_capabilities(&self, channel_id: i64) -> Result<RtpCapabilities, SfuError> {
        let mut channels = self.channels.lock().await;
        let channel = self.ensure_channel(&mut channels, channel_id).await?;
        Ok(channel.router.rtp_capabilities())
    }

    pub async fn create_transport(
        &self,
        channel_id: i64,
        user_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, SfuError> {
        let mut channels = self.channels.lock().await;
        let channel = self.ensure_channel(&mut channels, channel_id).await?;
        let transport = channel.router.create_transport().await?;

        let descriptor = TransportDescriptor {
            id: transport.id(),
            ice_parameters: transport.ice_parameters(),
            ice_candidates: transport.ice_candidates(),
            dtls_parameters: transport.dtls_parameters(),
        };

        let session = channel.sessions.entry(user_id.to_string()).or_default();
        match direction {
            TransportDirection::Send => session.send_transport = Some(transport),
            TransportDirection::Recv => session.recv_transport = Some(transport),
        }
        tracing::debug!(channel_id, user_id, ?direction, transport_id = %descriptor.id, "transport created");
        Ok(descriptor)
    }

    pub async fn connect_transport(
        &self,
        channel_id: i64,
        user_id: &str,
        transport_id: &str,
        dtls: DtlsParameters,
    ) -> Result<(), SfuError> {
        let transport = {
            let mut channels = self.channels.lock().await;
            let channel = channels
                .get_mut(&channel_id)
                .ok_or(SfuError::NotFound("channel voice state"))?;
            let session = channel
                .sessions
                .get(user_id)
                .ok_or(SfuError::NotFound("voice session"))?;
            session
                .send_transport
                .iter()
                .chain(session.recv_transport.iter())
                .find(|t| t.id() == transport_id)
                .cloned()
                .ok_or(SfuError::NotFound("transport"))?
        };
        transport.connect(dtls).await
    }

    pub async fn produce(
        &self,
        channel_id: i64,
        user_id: &str,
        nickname: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp: RtpParameters,
    ) -> Result<String, SfuError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(&channel_id)
            .ok_or(SfuError::NotFound("channel voice state"))?;
        let session = channel
            .sessions
            .get_mut(user_id)
            .ok_or(SfuError::NotFound("voice session"))?;

        let transport = session
            .send_transport
            .as_ref()
            .filter(|t| t.id() == transport_id)
            .cloned()
            .ok_or(SfuError::NotFound("send transport"))?;
        if session.producer.is_some() {
            return Err(SfuError::Precondition(
                "session already has a producer".to_string(),
            ));
        }

        let producer = transport.produce(kind, rtp).await?;
        let producer_id = producer.id();
        session.producer = Some(producer);
        channel.producer_owners.insert(
            producer_id.clone(),
            ProducerInfo {
                user_id: user_id.to_string(),
                nickname: nickname.to_string(),
                producer_id: producer_id.clone(),
            },
        );
        tracing::info!(channel_id, user_id, producer_id = %producer_id, "producer created");
        Ok(producer_id)
    }

    pub async fn consume(
        &self,
        channel_id: i64,
        user_id: &str,
        producer_id: &str,
        capabilities: Option<RtpCapabilities>,
    ) -> Result<ConsumerDescriptor, SfuError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(&channel_id)
            .ok_or(SfuError::NotFound("channel voice state"))?;
        if !channel.producer_owners.contains_key(producer_id) {
            return Err(SfuError::NotFound("producer"));
        }

        let capabilities = capabilities.unwrap_or_else(|| channel.router.rtp_capabilities());
        if !channel.router.can_consume(producer_id, &capabilities) {
            return Err(SfuError::Precondition(
                "cannot consume producer with the given capabilities".to_string(),
            ));
        }

        let session = channel
            .sessions
            .get_mut(user_id)
            .ok_or(SfuError::NotFound("voice session"))?;
        let transport = session
            .recv_transport
            .as_ref()
            .cloned()
            .ok_or_else(|| SfuError::Precondition("receive transport not created".to_string()))?;

        let consumer = transport.consume(producer_id, &capabilities).await?;
        let descriptor = ConsumerDescriptor {
            id: consumer.id(),
            producer_id: consumer.producer_id(),
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters(),
        };
        session.consumers.insert(consumer.id(), consumer);
        tracing::debug!(channel_id, user_id, consumer_id = %descriptor.id, "consumer created (paused)");
        Ok(descriptor)
    }

    pub async fn resume_consumer(
        &self,
        channel_id: i64,
        user_id: &str,
        consumer_id: &str,
    ) -> Result<(), SfuError> {
        let consumer = {
            let channels = self.channels.lock().await;
            let channel = channels
                .get(&channel_id)
                .ok_or(SfuError::NotFound("channel voice state"))?;
            let session = channel
                .sessions
                .get(user_id)
                .ok_or(SfuError::NotFound("voice session"))?;
            session
                .consumers
                .get(consumer_id)
                .cloned()
                .ok_or(SfuError::NotFound("consumer"))?
        };
        consumer.resume().await
    }

    pub async fn close_producer(
        &self,
        channel_id: i64,
        user_id: &str,
        producer_id: &str,
    ) -> Result<ClosedProducer, SfuError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(&channel_id)
            .ok_or(SfuError::NotFound("channel voice state"))?;
        let session = channel
            .sessions
            .get_mut(user_id)
            .ok_or(SfuError::NotFound("voice session"))?;

        let producer = session
            .producer
            .as_ref()
            .filter(|p| p.id() == producer_id)
            .cloned()
            .ok_or(SfuError::NotFound("producer"))?;
        session.producer = None;
        producer.close().await;
        channel.producer_owners.remove(producer_id);

        Self::drop_consumers_of(channel, producer_id).await;
        tracing::info!(channel_id, user_id, producer_id, "producer closed");
        Ok(ClosedProducer {
            producer_id: producer_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    /// Everyone in the channel who had a producer when the caller joined,
    /// except the caller.
    pub async fn existing_producers(&self, channel_id: i64, exclude_user: &str) -> Vec<ProducerInfo> {
        let channels = self.channels.lock().await;
        channels
            .get(&channel_id)
            .map(|channel| {
                channel
                    .producer_owners
                    .values()
                    .filter(|info| info.user_id != exclude_user)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Release a session's resources: consumers, producer, then transports.
    /// Closes the channel's router when the last session leaves. Returns the
    /// closed producer (if any) so the caller can broadcast PRODUCER_CLOSED.
    pub async fn cleanup_session(
        &self,
        channel_id: i64,
        user_id: &str,
    ) -> Option<ClosedProducer> {
        let mut channels = self.channels.lock().await;
        let channel = channels.get_mut(&channel_id)?;
        let mut session = channel.sessions.remove(user_id)?;

        for (_, consumer) in session.consumers.drain() {
            consumer.close().await;
        }

        let mut closed = None;
        if let Some(producer) = session.producer.take() {
            let producer_id = producer.id();
            producer.close().await;
            channel.producer_owners.remove(&producer_id);
            Self::drop_consumers_of(channel, &producer_id).await;
            closed = Some(ClosedProducer {
                producer_id,
                user_id: user_id.to_string(),
            });
        }

        if let Some(transport) = session.send_transport.take() {
            transport.close().await;
        }
        if let Some(transport) = session.recv_transport.take() {
            transport.close().await;
        }

        if channel.sessions.is_empty() {
            let channel = channels.remove(&channel_id).unwrap();
            channel.router.close().await;
            tracing::info!(channel_id, "voice router closed (channel empty)");
        }
        closed
    }

    async fn drop_consumers_of(channel: &mut ChannelVoice, producer_id: &str) {
        for session in channel.sessions.values_mut() {
            let stale: Vec<String> = session
                .consumers
                .iter()
                .filter(|(_, c)| c.producer_id() == producer_id)
                .map(|(id, _)| id.clone())
                .collect();
            for id in stale {
                if let Some(consumer) = session.consumers.remove(&id) {
                    consumer.close().await;
                }
            }
        }
    }

    pub async fn has_session(&self, channel_id: i64, user_id: &str) -> bool {
        let channels = self.channels.lock().await;
        channels
            .get(&channel_id)
            .map(|c| c.sessions.contains_key(user_id))
            .unwrap_or(false)
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}
