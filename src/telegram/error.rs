//! Classification of Telegram request failures.

use std::time::Duration;

use teloxide::{ApiError, RequestError};
use thiserror::Error;

/// Transport error as seen by the retry policies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OpsError {
    /// FloodWait: retry after exactly this long.
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// The message or chat is gone. Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Telegram refused the request. Never retried.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl OpsError {
    /// Whether a retry could change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout | Self::Network(_))
    }
}

impl From<RequestError> for OpsError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(secs) => Self::RateLimited(secs.duration()),
            RequestError::Network(e) if e.is_timeout() => Self::Timeout,
            RequestError::Network(e) => Self::Network(e.to_string()),
            RequestError::Io(e) => Self::Network(e.to_string()),
            RequestError::Api(api) => match api {
                ApiError::MessageToDeleteNotFound
                | ApiError::MessageToEditNotFound
                | ApiError::MessageToForwardNotFound
                | ApiError::MessageIdInvalid
                | ApiError::ChatNotFound => Self::NotFound(api.to_string()),
                other => Self::BadRequest(other.to_string()),
            },
            other => Self::BadRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes() {
        assert!(OpsError::RateLimited(Duration::from_secs(3)).is_transient());
        assert!(OpsError::Timeout.is_transient());
        assert!(OpsError::Network("reset".into()).is_transient());
        assert!(!OpsError::NotFound("gone".into()).is_transient());
        assert!(!OpsError::BadRequest("nope".into()).is_transient());
    }

    #[test]
    fn test_from_api_error() {
        let err: OpsError = RequestError::Api(ApiError::MessageToDeleteNotFound).into();
        assert!(matches!(err, OpsError::NotFound(_)));

        let err: OpsError = RequestError::Api(ApiError::BotBlocked).into();
        assert!(matches!(err, OpsError::BadRequest(_)));
    }
}
