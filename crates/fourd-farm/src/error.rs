use thiserror::Error;

#[derive(Debug, Error)]
pub enum FarmError {
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    #[error("resource missing: {0}")]
    ResourceMissing(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("farm driver rejected submission: {0}")]
    DriverRejected(String),

    #[error("core error: {0}")]
    Core(#[from] fourd_core::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, FarmError>;
