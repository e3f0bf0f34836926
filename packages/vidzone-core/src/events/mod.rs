//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for fan-out to subscribers
//! - Event types for the player, watchdog and preset domains

mod bridge;
pub(crate) mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::geometry::Geometry;
use crate::services::supervisor::PlaybackStatus;

/// Events broadcast to subscribers.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Renderer lifecycle and playback state changes.
    Player(PlayerEvent),

    /// Live stream supervision.
    Watchdog(WatchdogEvent),

    /// Preset store mutations.
    Preset(PresetEvent),
}

/// Events related to the renderer and the playback state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// A renderer was launched and playback began.
    Started {
        source: String,
        geometry: Geometry,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Playback was stopped on request.
    Stopped { timestamp: u64 },
    /// Status changed without a relaunch (pause toggle).
    StateChanged {
        status: PlaybackStatus,
        timestamp: u64,
    },
    /// The zone moved or was resized.
    GeometryChanged {
        geometry: Geometry,
        /// True when the renderer had to be restarted to apply it.
        restarted: bool,
        timestamp: u64,
    },
    /// The renderer died on its own while playing. Requested exits are
    /// reported as [`PlayerEvent::Stopped`] instead.
    ProcessExited {
        /// Source that was playing when the renderer died.
        source: String,
        code: Option<i32>,
        timestamp: u64,
    },
    /// A renderer could not be started.
    LaunchFailed {
        source: String,
        error: String,
        timestamp: u64,
    },
}

/// Events emitted while supervising a live stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WatchdogEvent {
    /// The stream stopped advancing or its renderer died.
    Stalled {
        source: String,
        reason: String,
        timestamp: u64,
    },
    /// A restart was submitted to the supervisor.
    RestartAttempted {
        source: String,
        /// 1-based attempt number since the stream was last healthy.
        attempt: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: u64,
    },
    /// The stream advanced again after a restart.
    Recovered { source: String, timestamp: u64 },
    /// The restart cap was reached and the stream was stopped.
    GaveUp {
        source: String,
        attempts: u32,
        timestamp: u64,
    },
}

/// Events related to the preset store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PresetEvent {
    Saved {
        name: String,
        geometry: Geometry,
        timestamp: u64,
    },
    Deleted { name: String, timestamp: u64 },
    DefaultChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        timestamp: u64,
    },
}

impl From<PlayerEvent> for BroadcastEvent {
    fn from(event: PlayerEvent) -> Self {
        BroadcastEvent::Player(event)
    }
}

impl From<WatchdogEvent> for BroadcastEvent {
    fn from(event: WatchdogEvent) -> Self {
        BroadcastEvent::Watchdog(event)
    }
}

impl From<PresetEvent> for BroadcastEvent {
    fn from(event: PresetEvent) -> Self {
        BroadcastEvent::Preset(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_event_is_tagged_by_category_and_type() {
        let event: BroadcastEvent = WatchdogEvent::GaveUp {
            source: "rtsp://cam/1".into(),
            attempts: 5,
            timestamp: 42,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "watchdog");
        assert_eq!(json["type"], "gaveUp");
        assert_eq!(json["attempts"], 5);
    }

    #[test]
    fn cleared_default_omits_name() {
        let json = serde_json::to_value(BroadcastEvent::from(PresetEvent::DefaultChanged {
            name: None,
            timestamp: 1,
        }))
        .unwrap();
        assert!(json.get("name").is_none());
    }
}
