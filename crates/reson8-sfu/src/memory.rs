//! In-process engine implementing the signaling side of the media contract.
//!
//! Descriptors (ICE, DTLS, RTP) are generated locally and capability
//! matching is a codec comparison; RTP forwarding itself is the external
//! engine's job and does not happen here. Used by single-machine dev
//! deployments and the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::engine::*;

const OPUS_CLOCK_RATE: u32 = 48_000;

fn opus_capability() -> RtpCodecCapability {
    RtpCodecCapability {
        mime_type: "audio/opus".to_string(),
        kind: MediaKind::Audio,
        clock_rate: OPUS_CLOCK_RATE,
        channels: 2,
        preferred_payload_type: 100,
    }
}

fn fingerprint_from(id: &Uuid) -> String {
    let bytes = id.as_bytes();
    let mut out = String::with_capacity(95);
    for (i, b) in bytes.iter().chain(bytes.iter()).enumerate() {
        if i > 0 {
            out.push(':');
        }
        out.push_str(&format!("{b:02X}"));
    }
    out
}

pub struct MemoryEngine;

impl MemoryEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SfuEngine for MemoryEngine {
    async fn spawn_worker(&self, settings: WorkerSettings) -> Result<Arc<dyn SfuWorker>, SfuError> {
        Ok(MemoryWorker::spawn(settings))
    }
}

pub struct MemoryWorker {
    id: String,
    settings: WorkerSettings,
    died_hooks: Mutex<Vec<DiedHook>>,
    next_port: AtomicU16,
}

impl MemoryWorker {
    pub fn spawn(settings: WorkerSettings) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            settings,
            died_hooks: Mutex::new(Vec::new()),
            next_port: AtomicU16::new(0),
        })
    }

    /// Simulate worker death; fires every registered hook. Test-only entry
    /// point for the fatal-worker path.
    pub fn kill(&self) {
        let hooks = self.died_hooks.lock().unwrap();
        for hook in hooks.iter() {
            hook(&self.id);
        }
    }

    fn allocate_port(&self) -> u16 {
        let span = self
            .settings
            .rtc_max_port
            .saturating_sub(self.settings.rtc_min_port)
            .max(1);
        let offset = self.next_port.fetch_add(1, Ordering::Relaxed) % span;
        self.settings.rtc_min_port + offset
    }
}

#[async_trait]
impl SfuWorker for MemoryWorker {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn create_router(&self) -> Result<Arc<dyn SfuRouter>, SfuError> {
        Ok(Arc::new(MemoryRouter {
            id: Uuid::new_v4().to_string(),
            announced_ip: self.settings.announced_ip.clone(),
            port: self.allocate_port(),
            shared: Arc::new(RouterShared {
                producers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }))
    }

    fn on_died(&self, hook: DiedHook) {
        self.died_hooks.lock().unwrap().push(hook);
    }
}

#[derive(Debug)]
struct RouterShared {
    /// Live producers on this router, by id.
    producers: Mutex<HashMap<String, MediaKind>>,
    closed: AtomicBool,
}

pub struct MemoryRouter {
    id: String,
    announced_ip: String,
    port: u16,
    shared: Arc<RouterShared>,
}

#[async_trait]
impl SfuRouter for MemoryRouter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn rtp_capabilities(&self) -> RtpCapabilities {
        RtpCapabilities {
            codecs: vec![opus_capability()],
        }
    }

    async fn create_transport(&self) -> Result<Arc<dyn SfuTransport>, SfuError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(SfuError::Engine("router is closed".to_string()));
        }
        let id = Uuid::new_v4();
        Ok(Arc::new(MemoryTransport {
            id: id.to_string(),
            ice_parameters: IceParameters {
                username_fragment: format!("uf{}", id.simple()),
                password: Uuid::new_v4().simple().to_string(),
                ice_lite: true,
            },
            ice_candidates: vec![IceCandidate {
                foundation: "udpcandidate".to_string(),
                priority: 1_076_302_079,
                ip: self.announced_ip.clone(),
                port: self.port,
                protocol: "udp".to_string(),
                candidate_type: "host".to_string(),
            }],
            dtls_parameters: DtlsParameters {
                role: "auto".to_string(),
                fingerprints: vec![DtlsFingerprint {
                    algorithm: "sha-256".to_string(),
                    value: fingerprint_from(&id),
                }],
            },
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            router: Arc::clone(&self.shared),
        }))
    }

    fn can_consume(&self, producer_id: &str, capabilities: &RtpCapabilities) -> bool {
        let producers = self.shared.producers.lock().unwrap();
        producers.contains_key(producer_id) && capabilities.supports(&opus_capability())
    }

    async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.producers.lock().unwrap().clear();
    }
}

pub struct MemoryTransport {
    id: String,
    ice_parameters: IceParameters,
    ice_candidates: Vec<IceCandidate>,
    dtls_parameters: DtlsParameters,
    connected: AtomicBool,
    closed: AtomicBool,
    router: Arc<RouterShared>,
}

#[async_trait]
impl SfuTransport for MemoryTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn ice_parameters(&self) -> IceParameters {
        self.ice_parameters.clone()
    }

    fn ice_candidates(&self) -> Vec<IceCandidate> {
        self.ice_candidates.clone()
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        self.dtls_parameters.clone()
    }

    async fn connect(&self, _dtls: DtlsParameters) -> Result<(), SfuError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SfuError::Precondition("transport is closed".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp: RtpParameters,
    ) -> Result<Arc<dyn SfuProducer>, SfuError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SfuError::Precondition(
                "transport must be connected before producing".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        self.router
            .producers
            .lock()
            .unwrap()
            .insert(id.clone(), kind);
        Ok(Arc::new(MemoryProducer {
            id,
            kind,
            router: Arc::clone(&self.router),
        }))
    }

    async fn consume(
        &self,
        producer_id: &str,
        capabilities: &RtpCapabilities,
    ) -> Result<Arc<dyn SfuConsumer>, SfuError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SfuError::Precondition(
                "transport must be connected before consuming".to_string(),
            ));
        }
        let kind = {
            let producers = self.router.producers.lock().unwrap();
            *producers
                .get(producer_id)
                .ok_or(SfuError::NotFound("producer"))?
        };
        if !capabilities.supports(&opus_capability()) {
            return Err(SfuError::Precondition(
                "cannot consume producer with the given capabilities".to_string(),
            ));
        }
        Ok(Arc::new(MemoryConsumer {
            id: Uuid::new_v4().to_string(),
            producer_id: producer_id.to_string(),
            kind,
            rtp_parameters: RtpParameters {
                codecs: vec![RtpCodecParameters {
                    mime_type: "audio/opus".to_string(),
                    payload_type: 100,
                    clock_rate: OPUS_CLOCK_RATE,
                    channels: 2,
                }],
            },
            // Consumers start paused; the client resumes after wiring its
            // receive pipeline.
            paused: AtomicBool::new(true),
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct MemoryProducer {
    id: String,
    kind: MediaKind,
    router: Arc<RouterShared>,
}

#[async_trait]
impl SfuProducer for MemoryProducer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn close(&self) {
        self.router.producers.lock().unwrap().remove(&self.id);
    }
}

pub struct MemoryConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    paused: AtomicBool,
}

#[async_trait]
impl SfuConsumer for MemoryConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn producer_id(&self) -> String {
        self.producer_id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> RtpParameters {
        self.rtp_parameters.clone()
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), SfuError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {}
}
