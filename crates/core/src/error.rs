use thiserror::Error;

pub type PopupResult<T> = Result<T, PopupError>;

#[derive(Error, Debug)]
pub enum PopupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client storage error: {0}")]
    Storage(String),

    #[error("Definition decode error: {0}")]
    Decode(String),

    #[error("Signal transport error: {0}")]
    Transport(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
