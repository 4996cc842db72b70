use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("revision fetch failed for zone {0}")]
    RevisionUnavailable(String),

    #[error("domain error: {0}")]
    Core(#[from] nexus_core::CoreError),
}
