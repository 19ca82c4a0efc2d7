pub mod coordinator;
pub mod engine;
pub mod memory;
pub mod pool;

pub use coordinator::{
    ClosedProducer, ConsumerDescriptor, ProducerInfo, SfuCoordinator, TransportDescriptor,
    TransportDirection,
};
pub use engine::{
    DtlsParameters, IceCandidate, IceParameters, MediaKind, RtpCapabilities, RtpParameters,
    SfuEngine, SfuError, WorkerSettings,
};
pub use pool::WorkerPool;
