use uuid::Uuid;

use crate::error::GatewayError;

/// Connection-scoped state, owned by the session loop. Identity is set by
/// USER_JOIN_SERVER and cleared by USER_LEAVE_SERVER or disconnect.
#[derive(Debug)]
pub struct Session {
    pub connection_id: String,
    pub user_id: Option<String>,
    pub nickname: String,
    pub server_id: Option<i64>,
    pub channel_id: Option<i64>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            connection_id: Uuid::new_v4().to_string(),
            user_id: None,
            nickname: String::new(),
            server_id: None,
            channel_id: None,
        }
    }

    /// The (user, server) pair, or NotAuthenticated before JOIN_SERVER.
    pub fn identity(&self) -> Result<(&str, i64), GatewayError> {
        match (self.user_id.as_deref(), self.server_id) {
            (Some(user_id), Some(server_id)) => Ok((user_id, server_id)),
            _ => Err(GatewayError::NotAuthenticated),
        }
    }

    /// The (user, server, channel) triple, for events that require being in
    /// a voice channel.
    pub fn voice_context(&self) -> Result<(&str, i64, i64), GatewayError> {
        let (user_id, server_id) = self.identity()?;
        let channel_id = self.channel_id.ok_or_else(|| {
            GatewayError::PreconditionFailed("not in a voice channel".to_string())
        })?;
        Ok((user_id, server_id, channel_id))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
