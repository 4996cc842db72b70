use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("domain error: {0}")]
    Core(#[from] nexus_core::CoreError),
}
