use thiserror::Error;

/// Errors raised constructing or validating domain values shared across the
/// workspace. Storage, cache and engine errors live in their own crates and
/// wrap this one with `#[from]`, the same composition the teacher uses for
/// `AuthzError`/`DatabaseError`/`CacheError`.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid subject reference: {0}")]
    InvalidSubject(String),

    #[error("invalid object reference: {0}")]
    InvalidObject(String),

    #[error("invalid relation name: {0}")]
    InvalidRelation(String),

    #[error("schema error: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
