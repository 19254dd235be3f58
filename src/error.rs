use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced by the matching and messaging core.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("this match is no longer active")]
    MatchInactive,
    #[error("concurrent update lost the race, re-read required")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ChatError {
    /// Stable snake_case code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "invalid_request",
            ChatError::NotFound(_) => "not_found",
            ChatError::Forbidden(_) => "forbidden",
            ChatError::MatchInactive => "match_inactive",
            ChatError::Conflict => "conflict",
            ChatError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => ChatError::Conflict,
            _ => ChatError::Unavailable(err.to_string()),
        }
    }
}

impl From<r2d2::Error> for ChatError {
    fn from(err: r2d2::Error) -> Self {
        ChatError::Unavailable(err.to_string())
    }
}
