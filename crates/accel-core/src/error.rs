//! 统一错误处理

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device enumeration failed: {0}")]
    EnumerationFailure(String),

    #[error("Failed to construct executor for device {ordinal}: {reason}")]
    ConstructionFailure { ordinal: usize, reason: String },

    #[error("Already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Unknown trace listener: {0}")]
    UnknownListener(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PlatformError {
    /// 驱动层错误携带完整的上下文链
    pub fn enumeration(err: &anyhow::Error) -> Self {
        Self::EnumerationFailure(format!("{err:#}"))
    }

    pub fn construction(ordinal: usize, err: &anyhow::Error) -> Self {
        Self::ConstructionFailure {
            ordinal,
            reason: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
