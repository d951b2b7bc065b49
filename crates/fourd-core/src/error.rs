//! Shared error kinds used across the capture control plane and the
//! container codecs (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    #[error("resource missing: {0}")]
    ResourceMissing(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("malformed frame record: {0}")]
    MalformedFrameRecord(String),

    #[error("malformed roll container: {0}")]
    MalformedRoll(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
