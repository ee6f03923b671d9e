use thiserror::Error;

/// Failure taxonomy shared by every store operation. Validation and existence
/// failures are raised before any mutation is attempted.
#[derive(Debug, Error)]
pub enum SocialError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type SocialResult<T> = Result<T, SocialError>;

impl SocialError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        SocialError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        SocialError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        SocialError::Forbidden(msg.into())
    }
}

impl From<rusqlite::Error> for SocialError {
    fn from(err: rusqlite::Error) -> Self {
        SocialError::Internal(err.into())
    }
}
