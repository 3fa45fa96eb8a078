use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Store operation failed: {0}")]
    OperationFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Publish failed: {0}")]
    PublishFailed(String),
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("Log entry not found: {log}[{index}]")]
    NotFound { log: String, index: isize },
    #[error("Store has been shut down")]
    ShutDown,
}

impl StoreError {
    /// Returns true for failures caused by the connection rather than the command.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StoreError::ConnectionFailed(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
