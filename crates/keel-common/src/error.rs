use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("configuration error: {0}")]
    ConfigError(#[from] figment::Error),
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CommonError {
    pub fn missing(message: impl Into<String>) -> Self {
        CommonError::MissingConfig(message.into())
    }
}
