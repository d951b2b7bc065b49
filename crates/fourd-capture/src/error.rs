use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    #[error("resource missing: {0}")]
    ResourceMissing(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("camera hardware error on {serial}: {text}")]
    CameraHardware { serial: String, text: String, require_restart: bool },

    #[error("core error: {0}")]
    Core(#[from] fourd_core::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
