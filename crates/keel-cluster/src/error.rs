use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("send error: {0}")]
    SendError(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ClusterError {
    pub fn internal(message: impl Into<String>) -> Self {
        ClusterError::InternalError(message.into())
    }
}

impl<T> From<SendError<T>> for ClusterError {
    fn from(error: SendError<T>) -> Self {
        ClusterError::SendError(error.to_string())
    }
}
