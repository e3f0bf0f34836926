//! Player supervisor: the single owner of the renderer and [`PlayerState`].
//!
//! Every mutating operation travels through one bounded, ordered command
//! queue into an actor task, so no two renderer commands are ever in flight
//! at once. The actor publishes immutable snapshots on a `watch` channel;
//! status reads never enter the queue.
//!
//! A second task listens to backend events. It writes position, duration and
//! pause state into the snapshot for the current renderer generation and
//! forwards process exits into the queue. It never issues renderer commands.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{VidzoneError, VidzoneResult};
use crate::events::{EventEmitter, PlayerEvent};
use crate::geometry::{DisplayConfig, Geometry};
use crate::media::MediaLibrary;
use crate::player::{BackendError, BackendEventKind, LaunchRequest, MediaBackend};
use crate::protocol_constants::{DEFAULT_LOOP, DEFAULT_VOLUME};
use crate::runtime::TaskSpawner;
use crate::utils::{is_live_stream, now_millis};

// ─────────────────────────────────────────────────────────────────────────────
// Player State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Snapshot of the video zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub status: PlaybackStatus,
    /// Source as given by the caller (file name or URL).
    pub source: Option<String>,
    #[serde(rename = "loop")]
    pub looped: bool,
    pub volume: u8,
    pub geometry: Geometry,
    /// Playback position in seconds.
    pub position: f64,
    /// Media duration in seconds, `None` when unknown.
    pub duration: Option<f64>,
    /// Incremented on every user-initiated play or stop.
    #[serde(skip)]
    pub session: u64,
    /// Renderer generation whose events feed this snapshot (0 = none).
    #[serde(skip)]
    pub(crate) generation: u64,
    /// The current renderer reported end of file or a playback error.
    #[serde(skip)]
    pub(crate) ended: bool,
    /// Live stream whose renderer died on its own; cleared by the next
    /// play or stop.
    #[serde(skip)]
    pub(crate) last_exit: Option<TrackedStream>,
}

impl PlayerState {
    pub(crate) fn initial(display: DisplayConfig) -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            source: None,
            looped: DEFAULT_LOOP,
            volume: DEFAULT_VOLUME,
            geometry: Geometry::full(display),
            position: 0.0,
            duration: None,
            session: 0,
            generation: 0,
            ended: false,
            last_exit: None,
        }
    }

    fn reset_to_stopped(&mut self) {
        self.status = PlaybackStatus::Stopped;
        self.source = None;
        self.position = 0.0;
        self.duration = None;
        self.generation = 0;
        self.ended = false;
    }
}

/// Snapshot plus renderer liveness, read without entering the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub state: PlayerState,
    pub renderer_alive: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// A validated play request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub source: String,
    pub looped: bool,
    pub volume: u8,
    /// Zone geometry; `None` keeps the current one.
    pub geometry: Option<Geometry>,
}

/// Everything needed to replay a stream without user input.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedStream {
    pub source: String,
    pub looped: bool,
    pub volume: u8,
    pub geometry: Geometry,
    /// Session the stream belongs to; restarts for older sessions are refused.
    pub session: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekTarget {
    Absolute(f64),
    Relative(f64),
}

type Reply<T> = oneshot::Sender<VidzoneResult<T>>;

enum Command {
    Play {
        request: PlayRequest,
        resolved: String,
        reply: Reply<PlayerState>,
    },
    Stop {
        reply: Reply<PlayerState>,
    },
    TogglePause {
        reply: Reply<PlaybackStatus>,
    },
    Seek {
        target: SeekTarget,
        reply: Reply<f64>,
    },
    SetVolume {
        volume: u8,
        reply: Reply<u8>,
    },
    SetGeometry {
        geometry: Geometry,
        reply: Reply<Geometry>,
    },
    SetDisplay {
        display: DisplayConfig,
        reply: Reply<Geometry>,
    },
    Restart {
        stream: TrackedStream,
        resolved: String,
        reply: Reply<()>,
    },
    StopSession {
        session: u64,
        reply: Reply<bool>,
    },
    ProcessExited {
        generation: u64,
        code: Option<i32>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Settings the supervisor needs at start.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub display: DisplayConfig,
    pub queue_capacity: usize,
}

/// Cloneable handle to the supervisor actor.
#[derive(Clone)]
pub struct PlayerSupervisor {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PlayerState>,
    display: Arc<RwLock<DisplayConfig>>,
    backend: Arc<dyn MediaBackend>,
    media: MediaLibrary,
}

impl PlayerSupervisor {
    /// Starts the actor and listener tasks and returns a handle.
    ///
    /// Both tasks stop when `cancel` fires; the actor terminates the renderer
    /// on its way out.
    pub fn start(
        backend: Arc<dyn MediaBackend>,
        media: MediaLibrary,
        emitter: Arc<dyn EventEmitter>,
        config: SupervisorConfig,
        cancel: CancellationToken,
        spawner: &impl TaskSpawner,
    ) -> Self {
        let (commands, queue) = mpsc::channel(config.queue_capacity.max(1));
        let (state_tx, state) = watch::channel(PlayerState::initial(config.display));
        let state_tx = Arc::new(state_tx);
        let display = Arc::new(RwLock::new(config.display));

        let listener = EventListener {
            events: backend.subscribe(),
            state: Arc::clone(&state_tx),
            commands: commands.downgrade(),
            emitter: Arc::clone(&emitter),
        };
        spawner.spawn(listener.run(cancel.clone()));

        let actor = SupervisorActor {
            backend: Arc::clone(&backend),
            emitter,
            state: state_tx,
            display: Arc::clone(&display),
            resolved_source: None,
            next_generation: 1,
        };
        spawner.spawn(actor.run(queue, cancel));

        Self {
            commands,
            state,
            display,
            backend,
            media,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> VidzoneResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| VidzoneError::Internal("player supervisor is not running".into()))?;
        rx.await
            .map_err(|_| VidzoneError::Internal("player supervisor dropped the request".into()))?
    }

    /// Starts playback, replacing any running renderer.
    pub async fn play(&self, request: PlayRequest) -> VidzoneResult<PlayerState> {
        let resolved = self.media.resolve(&request.source).await?;
        self.request(|reply| Command::Play {
            request,
            resolved,
            reply,
        })
        .await
    }

    /// Stops playback. Idempotent.
    pub async fn stop(&self) -> VidzoneResult<PlayerState> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Toggles between playing and paused.
    pub async fn toggle_pause(&self) -> VidzoneResult<PlaybackStatus> {
        self.request(|reply| Command::TogglePause { reply }).await
    }

    /// Seeks and returns the clamped target position.
    pub async fn seek(&self, target: SeekTarget) -> VidzoneResult<f64> {
        if !matches!(target, SeekTarget::Absolute(v) | SeekTarget::Relative(v) if v.is_finite()) {
            return Err(VidzoneError::Validation(
                "seek position must be a finite number".into(),
            ));
        }
        self.request(|reply| Command::Seek { target, reply }).await
    }

    /// Sets the volume, clamped to 0..=100. Returns the applied value.
    pub async fn set_volume(&self, volume: i64) -> VidzoneResult<u8> {
        let volume = clamp_volume(volume);
        self.request(|reply| Command::SetVolume { volume, reply })
            .await
    }

    /// Fits `geometry` to the display and applies it. Returns the fitted value.
    pub async fn set_geometry(&self, geometry: Geometry) -> VidzoneResult<Geometry> {
        self.request(|reply| Command::SetGeometry { geometry, reply })
            .await
    }

    /// Changes the display resolution and re-fits the current geometry.
    pub async fn set_display(&self, display: DisplayConfig) -> VidzoneResult<Geometry> {
        self.request(|reply| Command::SetDisplay { display, reply })
            .await
    }

    pub fn display(&self) -> DisplayConfig {
        *self.display.read()
    }

    /// Replays a tracked stream. Refused when the session moved on.
    pub async fn restart(&self, stream: TrackedStream) -> VidzoneResult<()> {
        let resolved = self.media.resolve(&stream.source).await?;
        self.request(|reply| Command::Restart {
            stream,
            resolved,
            reply,
        })
        .await
    }

    /// Stops playback only if `session` is still current. Returns whether it
    /// stopped anything.
    pub async fn stop_session(&self, session: u64) -> VidzoneResult<bool> {
        self.request(|reply| Command::StopSession { session, reply })
            .await
    }

    /// Latest published snapshot.
    pub fn status(&self) -> PlayerState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<PlayerState> {
        self.state.clone()
    }

    /// Snapshot plus renderer liveness.
    pub fn probe(&self) -> Probe {
        Probe {
            state: self.status(),
            renderer_alive: self.backend.is_running(),
        }
    }
}

pub(crate) fn clamp_volume(volume: i64) -> u8 {
    // Lossless: the value is within 0..=100 after clamping.
    volume.clamp(0, 100) as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct SupervisorActor {
    backend: Arc<dyn MediaBackend>,
    emitter: Arc<dyn EventEmitter>,
    state: Arc<watch::Sender<PlayerState>>,
    display: Arc<RwLock<DisplayConfig>>,
    /// Renderer argument for the current source (absolute path or URL).
    resolved_source: Option<String>,
    next_generation: u64,
}

/// How a launch relates to the user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LaunchKind {
    /// User play: new session.
    User,
    /// Watchdog restart or geometry fallback: same session.
    Replay,
}

struct LaunchSpec {
    source: String,
    resolved: String,
    looped: bool,
    volume: u8,
    geometry: Geometry,
    start_paused: bool,
    start_position: Option<f64>,
}

impl SupervisorActor {
    async fn run(mut self, mut queue: mpsc::Receiver<Command>, cancel: CancellationToken) {
        log::info!("[Supervisor] Started");
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = queue.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            self.handle(command).await;
        }

        if let Err(e) = self.backend.terminate().await {
            log::warn!("[Supervisor] Renderer shutdown failed: {}", e);
        }
        self.state.send_modify(PlayerState::reset_to_stopped);
        log::info!("[Supervisor] Stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Play {
                request,
                resolved,
                reply,
            } => {
                let _ = reply.send(self.play(request, resolved).await);
            }
            Command::Stop { reply } => {
                let _ = reply.send(Ok(self.stop().await));
            }
            Command::TogglePause { reply } => {
                let _ = reply.send(self.toggle_pause().await);
            }
            Command::Seek { target, reply } => {
                let _ = reply.send(self.seek(target).await);
            }
            Command::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume).await);
            }
            Command::SetGeometry { geometry, reply } => {
                let _ = reply.send(self.set_geometry(geometry).await);
            }
            Command::SetDisplay { display, reply } => {
                let _ = reply.send(self.set_display(display).await);
            }
            Command::Restart {
                stream,
                resolved,
                reply,
            } => {
                let _ = reply.send(self.restart(stream, resolved).await);
            }
            Command::StopSession { session, reply } => {
                let current = self.state.borrow().session;
                let stopped = if current == session {
                    self.stop().await;
                    true
                } else {
                    false
                };
                let _ = reply.send(Ok(stopped));
            }
            Command::ProcessExited { generation, code } => self.on_process_exit(generation, code),
        }
    }

    fn snapshot(&self) -> PlayerState {
        self.state.borrow().clone()
    }

    async fn play(&mut self, request: PlayRequest, resolved: String) -> VidzoneResult<PlayerState> {
        let display = *self.display.read();
        let geometry = match request.geometry {
            Some(geometry) => geometry.fit_to(display)?,
            None => self.snapshot().geometry.fit_to(display)?,
        };

        self.launch(
            LaunchSpec {
                source: request.source,
                resolved,
                looped: request.looped,
                volume: request.volume,
                geometry,
                start_paused: false,
                start_position: None,
            },
            LaunchKind::User,
        )
        .await?;
        Ok(self.snapshot())
    }

    async fn launch(&mut self, spec: LaunchSpec, kind: LaunchKind) -> VidzoneResult<()> {
        if let Err(e) = self.backend.terminate().await {
            log::warn!("[Supervisor] Terminating previous renderer failed: {}", e);
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let start_position = spec.start_position.unwrap_or(0.0);

        // Route early events from the new renderer into the snapshot before
        // the launch call returns.
        self.state.send_modify(|s| {
            if kind == LaunchKind::User {
                s.session += 1;
            }
            s.reset_to_stopped();
            s.last_exit = None;
            s.generation = generation;
            s.position = start_position;
            s.looped = spec.looped;
            s.volume = spec.volume;
            s.geometry = spec.geometry;
        });

        let request = LaunchRequest {
            generation,
            source: spec.resolved.clone(),
            geometry: spec.geometry,
            volume: spec.volume,
            looped: spec.looped,
            start_paused: spec.start_paused,
            start_position: spec.start_position,
        };

        match self.backend.launch(&request).await {
            Ok(handle) => {
                log::info!(
                    "[Supervisor] Playing {} (generation {}, pid {:?})",
                    spec.source,
                    handle.generation,
                    handle.pid
                );
                let status = if spec.start_paused {
                    PlaybackStatus::Paused
                } else {
                    PlaybackStatus::Playing
                };
                self.state.send_modify(|s| {
                    s.status = status;
                    s.source = Some(spec.source.clone());
                });
                self.resolved_source = Some(spec.resolved);
                self.emitter.emit_player(PlayerEvent::Started {
                    source: spec.source,
                    geometry: spec.geometry,
                    timestamp: now_millis(),
                });
                Ok(())
            }
            Err(e) => {
                log::error!("[Supervisor] Launch of {} failed: {}", spec.source, e);
                self.state.send_modify(PlayerState::reset_to_stopped);
                self.resolved_source = None;
                if let Err(e) = self.backend.terminate().await {
                    log::warn!("[Supervisor] Cleanup after failed launch: {}", e);
                }
                self.emitter.emit_player(PlayerEvent::LaunchFailed {
                    source: spec.source,
                    error: e.to_string(),
                    timestamp: now_millis(),
                });
                Err(launch_error(e))
            }
        }
    }

    async fn stop(&mut self) -> PlayerState {
        let was_active = self.snapshot().status.is_active();
        if let Err(e) = self.backend.terminate().await {
            log::warn!("[Supervisor] Renderer termination failed: {}", e);
        }
        self.resolved_source = None;
        self.state.send_modify(|s| {
            s.session += 1;
            s.reset_to_stopped();
            s.last_exit = None;
        });
        if was_active {
            log::info!("[Supervisor] Stopped playback");
            self.emitter.emit_player(PlayerEvent::Stopped {
                timestamp: now_millis(),
            });
        }
        self.snapshot()
    }

    fn require_active(&self, operation: &str) -> VidzoneResult<PlayerState> {
        let state = self.snapshot();
        if !state.status.is_active() {
            return Err(VidzoneError::InvalidState(format!(
                "cannot {operation} while stopped"
            )));
        }
        Ok(state)
    }

    async fn toggle_pause(&mut self) -> VidzoneResult<PlaybackStatus> {
        let state = self.require_active("pause")?;
        let pause = state.status == PlaybackStatus::Playing;
        self.backend.set_pause(pause).await?;

        let status = if pause {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Playing
        };
        self.state.send_modify(|s| s.status = status);
        self.emitter.emit_player(PlayerEvent::StateChanged {
            status,
            timestamp: now_millis(),
        });
        Ok(status)
    }

    async fn seek(&mut self, target: SeekTarget) -> VidzoneResult<f64> {
        let state = self.require_active("seek")?;
        let wanted = match target {
            SeekTarget::Absolute(position) => position,
            SeekTarget::Relative(delta) => state.position + delta,
        };
        let position = clamp_position(wanted, state.duration);

        self.backend.seek(position).await?;
        self.state.send_modify(|s| s.position = position);
        Ok(position)
    }

    async fn set_volume(&mut self, volume: u8) -> VidzoneResult<u8> {
        if self.snapshot().status.is_active() && self.backend.is_running() {
            self.backend.set_volume(volume).await?;
        }
        self.state.send_modify(|s| s.volume = volume);
        Ok(volume)
    }

    async fn set_geometry(&mut self, geometry: Geometry) -> VidzoneResult<Geometry> {
        let fitted = geometry.fit_to(*self.display.read())?;
        self.apply_geometry(fitted).await?;
        Ok(fitted)
    }

    async fn set_display(&mut self, display: DisplayConfig) -> VidzoneResult<Geometry> {
        *self.display.write() = display;
        log::info!("[Supervisor] Display resolution set to {}", display);

        let current = self.snapshot().geometry;
        let fitted = current.fit_to(display)?;
        if fitted != current {
            self.apply_geometry(fitted).await?;
        }
        Ok(fitted)
    }

    /// Applies an already fitted geometry, live when possible.
    async fn apply_geometry(&mut self, geometry: Geometry) -> VidzoneResult<()> {
        let state = self.snapshot();
        let mut restarted = false;

        if state.status.is_active() && self.backend.is_running() {
            match self.backend.set_geometry(geometry).await {
                Ok(()) => {}
                Err(BackendError::Unsupported(reason)) => {
                    log::info!(
                        "[Supervisor] Live resize unavailable ({}), restarting at {}",
                        reason,
                        geometry
                    );
                    self.relaunch_at(&state, geometry).await?;
                    restarted = true;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.state.send_modify(|s| s.geometry = geometry);
        self.emitter.emit_player(PlayerEvent::GeometryChanged {
            geometry,
            restarted,
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Restarts the current source at a new geometry, keeping the session,
    /// volume, loop flag, position and pause state.
    async fn relaunch_at(&mut self, state: &PlayerState, geometry: Geometry) -> VidzoneResult<()> {
        let (Some(source), Some(resolved)) = (state.source.clone(), self.resolved_source.clone())
        else {
            return Err(VidzoneError::InvalidState(
                "no source to restart".into(),
            ));
        };
        let start_position = (!is_live_stream(&source) && state.position > 0.0)
            .then_some(state.position);

        self.launch(
            LaunchSpec {
                source,
                resolved,
                looped: state.looped,
                volume: state.volume,
                geometry,
                start_paused: state.status == PlaybackStatus::Paused,
                start_position,
            },
            LaunchKind::Replay,
        )
        .await
    }

    async fn restart(&mut self, stream: TrackedStream, resolved: String) -> VidzoneResult<()> {
        let current = self.snapshot().session;
        if stream.session != current {
            return Err(VidzoneError::InvalidState(format!(
                "restart for session {} refused, current session is {}",
                stream.session, current
            )));
        }

        log::info!("[Supervisor] Restarting {}", stream.source);
        let geometry = stream.geometry.fit_to(*self.display.read())?;
        self.launch(
            LaunchSpec {
                source: stream.source,
                resolved,
                looped: stream.looped,
                volume: stream.volume,
                geometry,
                start_paused: false,
                start_position: None,
            },
            LaunchKind::Replay,
        )
        .await
    }

    fn on_process_exit(&mut self, generation: u64, code: Option<i32>) {
        let state = self.snapshot();
        if state.generation != generation || !state.status.is_active() {
            log::debug!(
                "[Supervisor] Ignoring exit of stale generation {}",
                generation
            );
            return;
        }

        log::warn!(
            "[Supervisor] Renderer exited unexpectedly (generation {}, code {:?}) while playing {}",
            generation,
            code,
            state.source.as_deref().unwrap_or("-")
        );
        self.resolved_source = None;
        let source = state.source.clone().unwrap_or_default();
        let crashed = is_live_stream(&source).then(|| TrackedStream {
            source: source.clone(),
            looped: state.looped,
            volume: state.volume,
            geometry: state.geometry,
            session: state.session,
        });
        self.state.send_modify(|s| {
            s.reset_to_stopped();
            s.last_exit = crashed;
        });
        self.emitter.emit_player(PlayerEvent::ProcessExited {
            source,
            code,
            timestamp: now_millis(),
        });
    }
}

fn launch_error(err: BackendError) -> VidzoneError {
    match err {
        BackendError::Launch(msg) => VidzoneError::LaunchFailed(msg),
        other => VidzoneError::LaunchFailed(other.to_string()),
    }
}

fn clamp_position(position: f64, duration: Option<f64>) -> f64 {
    let position = position.max(0.0);
    match duration {
        Some(duration) if duration.is_finite() && duration > 0.0 => position.min(duration),
        _ => position,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Listener
// ─────────────────────────────────────────────────────────────────────────────

struct EventListener {
    events: broadcast::Receiver<crate::player::BackendEvent>,
    state: Arc<watch::Sender<PlayerState>>,
    commands: mpsc::WeakSender<Command>,
    emitter: Arc<dyn EventEmitter>,
}

impl EventListener {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events.recv() => event,
            };
            match event {
                Ok(event) => self.apply(event.generation, event.kind).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("[Supervisor] Event listener lagged, skipped {}", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        log::debug!("[Supervisor] Event listener stopped");
    }

    async fn apply(&self, generation: u64, kind: BackendEventKind) {
        match kind {
            BackendEventKind::Position(position) => {
                self.state.send_if_modified(|s| {
                    let current = s.generation == generation && s.position != position;
                    if current {
                        s.position = position;
                    }
                    current
                });
            }
            BackendEventKind::Duration(duration) => {
                self.state.send_if_modified(|s| {
                    let current = s.generation == generation && s.duration != duration;
                    if current {
                        s.duration = duration;
                    }
                    current
                });
            }
            BackendEventKind::Paused(paused) => {
                let status = if paused {
                    PlaybackStatus::Paused
                } else {
                    PlaybackStatus::Playing
                };
                let changed = self.state.send_if_modified(|s| {
                    let current = s.generation == generation
                        && s.status.is_active()
                        && s.status != status;
                    if current {
                        s.status = status;
                    }
                    current
                });
                if changed {
                    self.emitter.emit_player(PlayerEvent::StateChanged {
                        status,
                        timestamp: now_millis(),
                    });
                }
            }
            BackendEventKind::EndOfStream { reason } => {
                match reason.as_deref() {
                    Some("error") => log::warn!(
                        "[Supervisor] Generation {} reported a playback error",
                        generation
                    ),
                    other => log::debug!(
                        "[Supervisor] Generation {} reached end of file ({:?})",
                        generation,
                        other
                    ),
                }
                // "stop", "quit" and "redirect" are requested or transient.
                if matches!(reason.as_deref(), Some("eof" | "error")) {
                    self.state.send_if_modified(|s| {
                        let current = s.generation == generation && s.status.is_active();
                        if current {
                            s.ended = true;
                        }
                        current
                    });
                }
            }
            BackendEventKind::Exited { code } => {
                if self.state.borrow().generation != generation {
                    return;
                }
                let Some(commands) = self.commands.upgrade() else {
                    return;
                };
                let _ = commands
                    .send(Command::ProcessExited { generation, code })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::tests::RecordingEventEmitter;
    use crate::player::fake::{FakeBackend, FakeCommand};
    use crate::runtime::TokioSpawner;
    use std::time::Duration;

    struct Harness {
        supervisor: PlayerSupervisor,
        backend: Arc<FakeBackend>,
        emitter: Arc<RecordingEventEmitter>,
        cancel: CancellationToken,
        _media: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let media = tempfile::tempdir().unwrap();
        std::fs::write(media.path().join("promo.mp4"), b"video").unwrap();
        std::fs::write(media.path().join("intro.mkv"), b"video").unwrap();

        let backend = Arc::new(FakeBackend::new());
        let emitter = Arc::new(RecordingEventEmitter::default());
        let cancel = CancellationToken::new();
        let supervisor = PlayerSupervisor::start(
            backend.clone(),
            MediaLibrary::new(media.path()),
            emitter.clone(),
            SupervisorConfig {
                display: DisplayConfig::default(),
                queue_capacity: 8,
            },
            cancel.clone(),
            &TokioSpawner::current(),
        );
        Harness {
            supervisor,
            backend,
            emitter,
            cancel,
            _media: media,
        }
    }

    fn play(source: &str) -> PlayRequest {
        PlayRequest {
            source: source.into(),
            looped: true,
            volume: 50,
            geometry: None,
        }
    }

    /// Waits until the listener has published a snapshot matching `pred`.
    async fn wait_for_state(h: &Harness, pred: impl Fn(&PlayerState) -> bool) -> PlayerState {
        let mut rx = h.supervisor.watch();
        let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
            .await
            .expect("state never matched")
            .unwrap()
            .clone();
        state
    }

    #[tokio::test]
    async fn first_play_uses_full_display() {
        let h = harness();
        let state = h.supervisor.play(play("promo.mp4")).await.unwrap();

        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.source.as_deref(), Some("promo.mp4"));
        assert_eq!(state.geometry, Geometry::new(0, 0, 1920, 1080));
        assert!(h.backend.launches()[0].source.ends_with("promo.mp4"));
    }

    #[tokio::test]
    async fn play_fits_requested_geometry() {
        let h = harness();
        let state = h
            .supervisor
            .play(PlayRequest {
                geometry: Some(Geometry::new(1800, 1000, 640, 360)),
                ..play("promo.mp4")
            })
            .await
            .unwrap();
        assert_eq!(state.geometry, Geometry::new(1280, 720, 640, 360));
    }

    #[tokio::test]
    async fn missing_file_is_not_found_and_launches_nothing() {
        let h = harness();
        let err = h.supervisor.play(play("absent.mp4")).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert!(h.backend.launches().is_empty());
    }

    #[tokio::test]
    async fn rapid_plays_never_overlap_renderers() {
        let h = harness();
        let plays = (0..10).map(|i| {
            let supervisor = h.supervisor.clone();
            let source = if i % 2 == 0 { "promo.mp4" } else { "intro.mkv" };
            tokio::spawn(async move { supervisor.play(play(source)).await })
        });
        for handle in futures::future::join_all(plays).await {
            handle.unwrap().unwrap();
        }

        assert_eq!(h.backend.overlaps(), 0);
        assert_eq!(h.backend.launches().len(), 10);
        assert_eq!(h.supervisor.status().session, 10);
    }

    #[tokio::test]
    async fn launch_failure_leaves_player_stopped() {
        let h = harness();
        h.backend.fail_launches(1);
        let err = h.supervisor.play(play("promo.mp4")).await.unwrap_err();

        assert_eq!(err.code(), "launch_failed");
        let state = h.supervisor.status();
        assert_eq!(state.status, PlaybackStatus::Stopped);
        assert_eq!(state.source, None);
        assert!(matches!(
            h.emitter.player.lock().last(),
            Some(PlayerEvent::LaunchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_clears_source() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();

        let first = h.supervisor.stop().await.unwrap();
        let second = h.supervisor.stop().await.unwrap();
        for state in [first, second] {
            assert_eq!(state.status, PlaybackStatus::Stopped);
            assert_eq!(state.source, None);
            assert_eq!(state.position, 0.0);
            assert_eq!(state.duration, None);
        }
        let stops = h
            .emitter
            .player
            .lock()
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Stopped { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn pause_and_seek_require_active_playback() {
        let h = harness();
        assert_eq!(
            h.supervisor.toggle_pause().await.unwrap_err().code(),
            "invalid_state"
        );
        assert_eq!(
            h.supervisor
                .seek(SeekTarget::Absolute(3.0))
                .await
                .unwrap_err()
                .code(),
            "invalid_state"
        );
    }

    #[tokio::test]
    async fn pause_toggles_between_playing_and_paused() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();

        assert_eq!(
            h.supervisor.toggle_pause().await.unwrap(),
            PlaybackStatus::Paused
        );
        assert_eq!(
            h.supervisor.toggle_pause().await.unwrap(),
            PlaybackStatus::Playing
        );
        assert!(h.backend.commands().contains(&FakeCommand::SetPause(true)));
    }

    #[tokio::test]
    async fn seek_is_clamped_to_known_duration() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();
        h.backend.emit(BackendEventKind::Duration(Some(120.0)));
        h.backend.emit(BackendEventKind::Position(30.0));
        wait_for_state(&h, |s| s.duration == Some(120.0) && s.position == 30.0).await;

        assert_eq!(
            h.supervisor.seek(SeekTarget::Relative(-45.0)).await.unwrap(),
            0.0
        );
        assert_eq!(
            h.supervisor.seek(SeekTarget::Absolute(500.0)).await.unwrap(),
            120.0
        );
        assert!(h.supervisor.seek(SeekTarget::Absolute(f64::NAN)).await.is_err());
    }

    #[tokio::test]
    async fn volume_is_clamped_and_stored_while_stopped() {
        let h = harness();
        assert_eq!(h.supervisor.set_volume(150).await.unwrap(), 100);
        assert_eq!(h.supervisor.set_volume(-3).await.unwrap(), 0);
        assert!(!h
            .backend
            .commands()
            .iter()
            .any(|c| matches!(c, FakeCommand::SetVolume(_))));

        h.supervisor.play(play("promo.mp4")).await.unwrap();
        h.supervisor.set_volume(70).await.unwrap();
        assert!(h.backend.commands().contains(&FakeCommand::SetVolume(70)));
    }

    #[tokio::test]
    async fn geometry_is_applied_live_without_restart() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();

        let fitted = h
            .supervisor
            .set_geometry(Geometry::new(-10, 900, 640, 360))
            .await
            .unwrap();
        assert_eq!(fitted, Geometry::new(0, 720, 640, 360));
        assert_eq!(h.supervisor.status().geometry, fitted);
        assert_eq!(h.backend.launches().len(), 1);
        assert!(h.backend.commands().contains(&FakeCommand::SetGeometry(fitted)));
    }

    #[tokio::test]
    async fn unsupported_live_resize_falls_back_to_restart() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();
        h.backend.emit(BackendEventKind::Position(42.0));
        wait_for_state(&h, |s| s.position == 42.0).await;
        h.supervisor.toggle_pause().await.unwrap();
        let session = h.supervisor.status().session;

        h.backend.set_live_geometry_unsupported(true);
        let fitted = h
            .supervisor
            .set_geometry(Geometry::new(100, 100, 800, 600))
            .await
            .unwrap();

        let launches = h.backend.launches();
        assert_eq!(launches.len(), 2);
        let relaunch = &launches[1];
        assert_eq!(relaunch.geometry, fitted);
        assert_eq!(relaunch.start_position, Some(42.0));
        assert!(relaunch.start_paused);
        assert_eq!(h.backend.overlaps(), 0);

        let state = h.supervisor.status();
        assert_eq!(state.status, PlaybackStatus::Paused);
        assert_eq!(state.session, session);
        assert_eq!(state.source.as_deref(), Some("promo.mp4"));
    }

    #[tokio::test]
    async fn geometry_while_stopped_is_stored_for_next_play() {
        let h = harness();
        let fitted = h
            .supervisor
            .set_geometry(Geometry::new(0, 0, 960, 1080))
            .await
            .unwrap();
        let state = h.supervisor.play(play("promo.mp4")).await.unwrap();
        assert_eq!(state.geometry, fitted);
        assert_eq!(h.backend.launches()[0].geometry, fitted);
    }

    #[tokio::test]
    async fn undersized_geometry_is_rejected() {
        let h = harness();
        let err = h
            .supervisor
            .set_geometry(Geometry::new(0, 0, 50, 50))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[tokio::test]
    async fn shrinking_display_refits_current_geometry() {
        let h = harness();
        h.supervisor
            .set_geometry(Geometry::new(1280, 720, 640, 360))
            .await
            .unwrap();
        let fitted = h
            .supervisor
            .set_display(DisplayConfig::new(1280, 720).unwrap())
            .await
            .unwrap();
        assert_eq!(fitted, Geometry::new(640, 360, 640, 360));
        assert_eq!(h.supervisor.display(), DisplayConfig::new(1280, 720).unwrap());
    }

    #[tokio::test]
    async fn crash_resets_state_and_stale_exits_are_ignored() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();
        // A second play terminates generation 1; its exit must not stop generation 2.
        h.supervisor.play(play("intro.mkv")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.supervisor.status().status, PlaybackStatus::Playing);

        h.backend.crash();
        let state = wait_for_state(&h, |s| s.status == PlaybackStatus::Stopped).await;
        assert_eq!(state.source, None);
        assert!(h
            .emitter
            .player
            .lock()
            .iter()
            .any(|e| matches!(e, PlayerEvent::ProcessExited { source, .. } if source == "intro.mkv")));
    }

    #[tokio::test]
    async fn restart_is_refused_for_stale_session() {
        let h = harness();
        let state = h.supervisor.play(play("promo.mp4")).await.unwrap();
        let stream = TrackedStream {
            source: "promo.mp4".into(),
            looped: true,
            volume: 50,
            geometry: state.geometry,
            session: state.session,
        };

        h.supervisor.restart(stream.clone()).await.unwrap();
        assert_eq!(h.supervisor.status().session, state.session);

        h.supervisor.stop().await.unwrap();
        let err = h.supervisor.restart(stream).await.unwrap_err();
        assert_eq!(err.code(), "invalid_state");
        assert_eq!(h.backend.launches().len(), 2);
    }

    #[tokio::test]
    async fn stop_session_only_stops_matching_session() {
        let h = harness();
        let state = h.supervisor.play(play("promo.mp4")).await.unwrap();

        assert!(!h.supervisor.stop_session(state.session + 5).await.unwrap());
        assert_eq!(h.supervisor.status().status, PlaybackStatus::Playing);

        assert!(h.supervisor.stop_session(state.session).await.unwrap());
        assert_eq!(h.supervisor.status().status, PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn pause_property_from_renderer_updates_status() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();
        h.backend.emit(BackendEventKind::Paused(true));
        wait_for_state(&h, |s| s.status == PlaybackStatus::Paused).await;
    }

    #[tokio::test]
    async fn crash_of_live_stream_is_remembered_until_next_play() {
        let h = harness();
        let started = h
            .supervisor
            .play(play("rtsp://10.0.0.8:554/stream1"))
            .await
            .unwrap();

        h.backend.crash();
        let state = wait_for_state(&h, |s| s.status == PlaybackStatus::Stopped).await;
        let crashed = state.last_exit.expect("live crash should be remembered");
        assert_eq!(crashed.source, "rtsp://10.0.0.8:554/stream1");
        assert_eq!(crashed.session, started.session);
        assert!(crashed.looped);

        h.supervisor.play(play("promo.mp4")).await.unwrap();
        assert_eq!(h.supervisor.status().last_exit, None);
    }

    #[tokio::test]
    async fn crash_of_local_file_is_not_remembered() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();
        h.backend.crash();
        let state = wait_for_state(&h, |s| s.status == PlaybackStatus::Stopped).await;
        assert_eq!(state.last_exit, None);
    }

    #[tokio::test]
    async fn end_of_file_is_flagged_until_relaunch() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();

        h.backend.emit(BackendEventKind::EndOfStream {
            reason: Some("stop".into()),
        });
        h.backend.emit(BackendEventKind::Paused(true));
        let state = wait_for_state(&h, |s| s.status == PlaybackStatus::Paused).await;
        assert!(!state.ended);

        h.backend.emit(BackendEventKind::EndOfStream {
            reason: Some("eof".into()),
        });
        wait_for_state(&h, |s| s.ended).await;

        h.supervisor.play(play("promo.mp4")).await.unwrap();
        assert!(!h.supervisor.status().ended);
    }

    #[tokio::test]
    async fn cancellation_terminates_renderer() {
        let h = harness();
        h.supervisor.play(play("promo.mp4")).await.unwrap();
        h.cancel.cancel();
        wait_for_state(&h, |s| s.status == PlaybackStatus::Stopped).await;
        assert!(!h.backend.is_running());
        assert_eq!(
            h.supervisor.stop().await.unwrap_err().code(),
            "internal_error"
        );
    }

    #[test]
    fn state_serializes_for_http_boundary() {
        let json = serde_json::to_value(PlayerState::initial(DisplayConfig::default())).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["loop"], true);
        assert_eq!(json["volume"], 50);
        assert!(json["duration"].is_null());
        assert!(json.get("session").is_none());
    }
}
