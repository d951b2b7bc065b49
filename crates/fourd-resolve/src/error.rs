use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    #[error("resource missing: {0}")]
    ResourceMissing(String),

    #[error("malformed cache entry: {0}")]
    MalformedCacheEntry(String),

    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error("core error: {0}")]
    Core(#[from] fourd_core::Error),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
