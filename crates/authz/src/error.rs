use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthzError>;

/// Errors the Admin/Bulk Interface surfaces to callers. The Check Engine's
/// `check`/`check_bulk` entry points never return this type directly —
/// spec.md §7's fail-closed posture means every variant here collapses to
/// `deny` at the check boundary rather than propagating (see
/// `CheckEngine::check`). `rebac_create`/`rebac_delete`/`reset_zone` do
/// surface it, since a write failure is fatal by design.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("tuple not found: {0}")]
    NotFound(String),

    #[error("invalid subject reference: {0}")]
    InvalidSubject(String),

    #[error("invalid object reference: {0}")]
    InvalidObject(String),

    #[error("storage unavailable: {0}")]
    Store(#[from] nexus_store::StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] nexus_cache::CacheError),

    #[error("index error: {0}")]
    Index(#[from] nexus_index::IndexError),

    #[error("domain error: {0}")]
    Core(#[from] nexus_core::CoreError),
}
