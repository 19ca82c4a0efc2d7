use reson8_core::error::CoreError;
use reson8_sfu::SfuError;
use thiserror::Error;

/// Everything an event handler can fail with. Converted into a negative ack
/// (or an ERROR push) at the session loop; never surfaces on the transport.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("permission denied")]
    PermissionDenied,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("internal error")]
    Backend(String),
}

impl From<CoreError> for GatewayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => GatewayError::NotFound(what.to_string()),
            CoreError::MissingPermission => GatewayError::PermissionDenied,
            CoreError::InvalidInput(message) => GatewayError::InvalidInput(message),
            CoreError::Db(cause) => GatewayError::Backend(cause.to_string()),
        }
    }
}

impl From<SfuError> for GatewayError {
    fn from(err: SfuError) -> Self {
        match err {
            SfuError::NotFound(what) => GatewayError::NotFound(what.to_string()),
            SfuError::Precondition(message) => GatewayError::PreconditionFailed(message),
            SfuError::Engine(cause) => GatewayError::Backend(cause),
        }
    }
}

impl From<reson8_db::DbError> for GatewayError {
    fn from(err: reson8_db::DbError) -> Self {
        GatewayError::Backend(err.to_string())
    }
}

impl GatewayError {
    /// The short message put into `{success: false, error}` acks. Backend
    /// details stay in the log, not on the wire.
    pub fn public_message(&self) -> String {
        self.to_string()
    }

    pub fn internal_detail(&self) -> Option<&str> {
        match self {
            GatewayError::Backend(detail) => Some(detail),
            _ => None,
        }
    }
}
