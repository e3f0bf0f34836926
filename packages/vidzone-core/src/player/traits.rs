//! Trait abstraction for the media renderer.
//!
//! The supervisor depends on [`MediaBackend`] rather than on the mpv process
//! directly, so tests drive it with an in-memory backend.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use super::ipc::TransportError;
use super::types::{BackendEvent, LaunchHandle, LaunchRequest};
use crate::geometry::Geometry;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The renderer could not be spawned or never accepted IPC connections.
    #[error("renderer launch failed: {0}")]
    Launch(String),

    #[error("no renderer is running")]
    NotRunning,

    /// The renderer does not support the requested runtime change.
    #[error("renderer does not support this operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Capability boundary around one renderer subprocess.
///
/// At most one renderer exists at a time: `launch` replaces any previous
/// instance. Commands issued while nothing runs fail with
/// [`BackendError::NotRunning`].
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Starts a renderer and waits until it accepts commands.
    async fn launch(&self, request: &LaunchRequest) -> BackendResult<LaunchHandle>;

    /// Stops the current renderer. Idempotent.
    async fn terminate(&self) -> BackendResult<()>;

    /// Returns true while a renderer process is alive.
    fn is_running(&self) -> bool;

    async fn set_pause(&self, paused: bool) -> BackendResult<()>;

    /// Seeks to an absolute position in seconds.
    async fn seek(&self, position: f64) -> BackendResult<()>;

    async fn set_volume(&self, volume: u8) -> BackendResult<()>;

    /// Moves and resizes the renderer window in place.
    ///
    /// Returns [`BackendError::Unsupported`] when the renderer cannot do this
    /// without a restart.
    async fn set_geometry(&self, geometry: Geometry) -> BackendResult<()>;

    /// Subscribes to events from all renderer generations.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}
