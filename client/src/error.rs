use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a valid email is required")]
    InvalidEmail,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded {status}: {message}")]
    Api { status: u16, message: String },
    #[error("local storage failed: {0}")]
    Storage(#[from] std::io::Error),
    #[error("local state is not valid json: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
