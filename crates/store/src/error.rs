use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("tuple not found: {0}")]
    TupleNotFound(String),

    #[error("invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("domain error: {0}")]
    Core(#[from] nexus_core::CoreError),

    #[error("internal error: {0}")]
    Internal(String),
}
