use crate::token::RejectReason;
use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrfError {
    #[error("Secret key must be at least 32 bytes, got {len}")]
    SecretTooShort { len: usize },

    #[error("Token TTL must be at least 15 seconds, got {0}")]
    InvalidTtl(i64),

    #[error("Token generation failed: {0}")]
    GenerationFailed(String),

    /// The reason is kept for internal logging only; `Display` is uniform
    /// so it can be shown to clients as-is.
    #[error("CSRF validation failed")]
    Rejected(RejectReason),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_urlencoded::ser::Error),

    #[error("Query decode error: {0}")]
    Deserialization(#[from] serde_urlencoded::de::Error),
}

impl CsrfError {
    /// HTTP status to answer with when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            CsrfError::Rejected(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rejection kind, if this error is a token rejection.
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            CsrfError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CsrfError>;
