//! Types exchanged across the media backend boundary.

use crate::geometry::Geometry;

/// Everything a backend needs to start one renderer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    /// Renderer generation assigned by the supervisor. Every event the
    /// instance produces is tagged with it.
    pub generation: u64,
    /// Resolved source: an absolute file path or a URL.
    pub source: String,
    pub geometry: Geometry,
    pub volume: u8,
    pub looped: bool,
    /// Start in the paused state.
    pub start_paused: bool,
    /// Seek to this position (seconds) on start.
    pub start_position: Option<f64>,
}

/// Identity of a launched renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchHandle {
    pub generation: u64,
    pub pid: Option<u32>,
}

/// Asynchronous notification from a renderer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    pub generation: u64,
    pub kind: BackendEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEventKind {
    /// Playback position in seconds.
    Position(f64),
    /// Media duration in seconds, `None` when unknown (live streams).
    Duration(Option<f64>),
    Paused(bool),
    /// The renderer finished or abandoned the current file.
    EndOfStream { reason: Option<String> },
    /// The renderer process exited.
    Exited { code: Option<i32> },
}
