/// Error types for the coordinator, the adapters and the REST client
use crate::models::Backend;
use thiserror::Error;

/// Failure reported by a vendor client binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorError(pub String);

impl std::fmt::Display for VendorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for VendorError {}

/// Errors from the application's own `/media/*` endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("session is not authorized")]
    Unauthorized,

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors surfaced by coordinator commands
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Transient; controls for this backend should stay disabled until ready
    #[error("{0} backend is not ready")]
    NotReady(Backend),

    #[error("remote device id not yet assigned")]
    MissingDevice,

    /// Terminal until the account is upgraded
    #[error("premium account required for remote playback")]
    PremiumRequired,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("no active backend")]
    NoActiveBackend,

    #[error(transparent)]
    Api(ApiError),

    #[error("vendor client error: {0}")]
    Vendor(#[from] VendorError),
}

impl From<ApiError> for PlaybackError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => {
                PlaybackError::Authentication("media session rejected".to_string())
            }
            other => PlaybackError::Api(other),
        }
    }
}
