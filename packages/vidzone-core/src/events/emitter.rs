//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative delivery implementations.

use super::{PlayerEvent, PresetEvent, WatchdogEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit_player(PlayerEvent::Stopped { timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a renderer lifecycle or playback state event.
    fn emit_player(&self, event: PlayerEvent);

    /// Emits a live stream supervision event.
    fn emit_watchdog(&self, event: WatchdogEvent);

    /// Emits a preset store event.
    fn emit_preset(&self, event: PresetEvent);
}

/// No-op emitter for tests and embedders that do not consume events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_player(&self, _event: PlayerEvent) {}

    fn emit_watchdog(&self, _event: WatchdogEvent) {}

    fn emit_preset(&self, _event: PresetEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_player(&self, event: PlayerEvent) {
        tracing::debug!(?event, "player_event");
    }

    fn emit_watchdog(&self, event: WatchdogEvent) {
        tracing::debug!(?event, "watchdog_event");
    }

    fn emit_preset(&self, event: PresetEvent) {
        tracing::debug!(?event, "preset_event");
    }
}
