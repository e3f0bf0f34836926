//! Centralized error types for the vidzone core library.
//!
//! This module provides a unified error handling system that:
//! - Defines the application-wide [`VidzoneError`] taxonomy using `thiserror`
//! - Converts module-level errors (transport, backend, presets, media) into it
//! - Maps errors to machine-readable codes and HTTP-style status numbers for
//!   the request router that sits in front of the control facade

use serde::Serialize;
use thiserror::Error;

use crate::geometry::GeometryError;
use crate::media::MediaError;
use crate::player::ipc::TransportError;
use crate::player::traits::BackendError;
use crate::services::preset_store::PresetError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "transport_timeout",
            Self::Closed => "transport_closed",
            Self::Command { .. } => "renderer_command_failed",
            Self::Io(_) => "transport_io_failed",
            Self::Encode(_) => "transport_encode_failed",
        }
    }
}

impl ErrorCode for BackendError {
    fn code(&self) -> &'static str {
        match self {
            Self::Launch(_) => "launch_failed",
            Self::NotRunning => "renderer_not_running",
            Self::Unsupported(_) => "renderer_unsupported",
            Self::Transport(e) => e.code(),
        }
    }
}

impl ErrorCode for PresetError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "preset_not_found",
            Self::InvalidName(_) => "invalid_preset_name",
            Self::InvalidGeometry(_) => "invalid_preset_geometry",
            Self::Io(_) | Self::Serialize(_) => "preset_write_failed",
        }
    }
}

/// Application-wide error type surfaced by the control facade.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum VidzoneError {
    /// The renderer could not be started or never became ready.
    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    /// A renderer command did not complete within its timeout.
    #[error("Renderer command timed out: {0}")]
    TransportTimeout(String),

    /// The renderer control channel is not connected.
    #[error("Renderer channel closed: {0}")]
    TransportClosed(String),

    /// The operation is not valid for the current playback state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Out-of-range or malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown preset name or missing media file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The preset store could not be written; in-memory state is unchanged.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal failure (e.g. the supervisor task is gone).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VidzoneError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LaunchFailed(_) => "launch_failed",
            Self::TransportTimeout(_) => "transport_timeout",
            Self::TransportClosed(_) => "transport_closed",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an HTTP status number for the request router.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::InvalidState(_) => 409,
            Self::TransportTimeout(_) => 504,
            Self::TransportClosed(_) => 503,
            Self::LaunchFailed(_) | Self::Persistence(_) | Self::Internal(_) => 500,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type VidzoneResult<T> = Result<T, VidzoneError>;

/// JSON body shape for error responses at the HTTP boundary.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
}

impl From<&VidzoneError> for ErrorBody {
    fn from(err: &VidzoneError) -> Self {
        Self {
            error: err.code(),
            message: err.to_string(),
            status: err.status_code(),
        }
    }
}

impl From<TransportError> for VidzoneError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { .. } => Self::TransportTimeout(err.to_string()),
            TransportError::Closed | TransportError::Io(_) => {
                Self::TransportClosed(err.to_string())
            }
            TransportError::Command { .. } | TransportError::Encode(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<BackendError> for VidzoneError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Launch(msg) => Self::LaunchFailed(msg),
            BackendError::NotRunning => Self::TransportClosed(err.to_string()),
            BackendError::Unsupported(_) => Self::Internal(err.to_string()),
            BackendError::Transport(e) => e.into(),
        }
    }
}

impl From<PresetError> for VidzoneError {
    fn from(err: PresetError) -> Self {
        match err {
            PresetError::NotFound(_) => Self::NotFound(err.to_string()),
            PresetError::InvalidName(_) | PresetError::InvalidGeometry(_) => {
                Self::Validation(err.to_string())
            }
            PresetError::Io(_) | PresetError::Serialize(_) => Self::Persistence(err.to_string()),
        }
    }
}

impl From<GeometryError> for VidzoneError {
    fn from(err: GeometryError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<MediaError> for VidzoneError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotFound(_) => Self::NotFound(err.to_string()),
            MediaError::InvalidName(_) => Self::Validation(err.to_string()),
            MediaError::Io(_) => Self::Internal(err.to_string()),
        }
    }
}
