pub mod admin;
pub mod channel;
pub mod error;
pub mod message;
pub mod permissions;
pub mod presence;
pub mod rooms;
pub mod tree;

use std::sync::Arc;
use std::time::Instant;

use presence::PresenceStore;
use reson8_db::DbPool;
use reson8_sfu::SfuCoordinator;
use rooms::RoomBroker;
use serde::Serialize;

/// TURN relay credentials returned to clients during transport creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCredentials {
    pub url: String,
    pub username: String,
    pub credential: String,
}

/// Runtime settings the event handlers need.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub turn: Option<TurnCredentials>,
    /// A client connecting with this installation id is auto-assigned the
    /// admin role on join.
    pub admin_instance_id: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub presence: Arc<PresenceStore>,
    pub rooms: Arc<RoomBroker>,
    pub sfu: Arc<SfuCoordinator>,
    pub config: AppConfig,
    pub started_at: Instant,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
