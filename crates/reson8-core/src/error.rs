use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("missing permission")]
    MissingPermission,
    #[error("{0}")]
    InvalidInput(String),
    #[error("database error: {0}")]
    Db(#[from] reson8_db::DbError),
}
