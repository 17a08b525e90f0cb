use thiserror::Error;

/// Errors produced by the bridge protocol layer.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("framing error: {0}")]
    Framing(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown host service {0}")]
    UnknownService(String),

    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("duplicate device: {0}")]
    DuplicateDevice(String),

    #[error("forwarder already bound: tcp:{0}")]
    ForwarderBound(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
