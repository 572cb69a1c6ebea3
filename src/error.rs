// Everything that can go wrong in the issuance and check-in flows.
//
// AttendanceError is what the UI-facing components report. The other enums
// sit at the edges (transport, camera, config) and get folded into it.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("please enter a whole number of minutes, got {0:?}")]
    NotANumber(String),
    #[error("duration must be at least 1 minute, got {minutes}")]
    TooShort { minutes: i64 },
    #[error("no duration has been confirmed yet")]
    NotConfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttendanceError {
    /// Local validation only, this never reaches the network.
    #[error("invalid duration: {0}")]
    InvalidDuration(#[from] DurationError),
    #[error("could not create the QR code: {0}")]
    IssuanceFailed(String),
    #[error("camera unavailable: {0}. Check that camera permission is granted for this app")]
    CameraUnavailable(String),
    #[error("{0}")]
    CheckInRejected(String),
    /// An issuance response for request `request_id` arrived after a newer
    /// request was made. Discarded, never shown.
    #[error("response for request {request_id} was superseded")]
    StaleResponse { request_id: u64 },
}

impl AttendanceError {
    // Whether this error belongs in front of the user at all
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, AttendanceError::StaleResponse { .. })
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status. `message` is its
    /// `{ message }` body verbatim, or the reason phrase if it sent none.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Never sent: the base URL or an id can't be turned into a request.
    #[error("{0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            ApiError::InvalidRequest(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("permission to use the camera was denied")]
    PermissionDenied,
    #[error("no camera was found")]
    NoDevice,
    #[error("{0}")]
    Device(String),
}

impl From<CameraError> for AttendanceError {
    fn from(err: CameraError) -> Self {
        AttendanceError::CameraUnavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a home directory for the app data")]
    NoHomeDirectory,
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse JSON in {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
}
