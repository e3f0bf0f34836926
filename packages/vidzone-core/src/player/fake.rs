//! In-memory backend for supervisor and facade tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::traits::{BackendError, BackendResult, MediaBackend};
use super::types::{BackendEvent, BackendEventKind, LaunchHandle, LaunchRequest};
use crate::geometry::Geometry;

/// Commands recorded by [`FakeBackend`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FakeCommand {
    Launch(LaunchRequest),
    Terminate,
    SetPause(bool),
    Seek(f64),
    SetVolume(u8),
    SetGeometry(Geometry),
}

#[derive(Default)]
struct FakeState {
    running: Option<u64>,
    commands: Vec<FakeCommand>,
    failing_launches: u32,
    live_geometry_unsupported: bool,
}

/// Scriptable stand-in for the mpv backend.
///
/// Launch requests never auto-terminate a running instance, so a supervisor
/// that forgets to stop the old renderer shows up in [`overlaps`].
///
/// [`overlaps`]: FakeBackend::overlaps
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
    overlaps: AtomicUsize,
    events: broadcast::Sender<BackendEvent>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(FakeState::default()),
            overlaps: AtomicUsize::new(0),
            events,
        }
    }

    pub(crate) fn commands(&self) -> Vec<FakeCommand> {
        self.state.lock().commands.clone()
    }

    pub(crate) fn launches(&self) -> Vec<LaunchRequest> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                FakeCommand::Launch(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    /// Number of launches issued while another instance was still running.
    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Makes the next `n` launches fail.
    pub(crate) fn fail_launches(&self, n: u32) {
        self.state.lock().failing_launches = n;
    }

    pub(crate) fn set_live_geometry_unsupported(&self, unsupported: bool) {
        self.state.lock().live_geometry_unsupported = unsupported;
    }

    pub(crate) fn current_generation(&self) -> Option<u64> {
        self.state.lock().running
    }

    /// Emits an event from the running instance.
    pub(crate) fn emit(&self, kind: BackendEventKind) {
        if let Some(generation) = self.current_generation() {
            let _ = self.events.send(BackendEvent { generation, kind });
        }
    }

    /// Simulates the renderer dying on its own.
    pub(crate) fn crash(&self) {
        let generation = self.state.lock().running.take();
        if let Some(generation) = generation {
            let _ = self.events.send(BackendEvent {
                generation,
                kind: BackendEventKind::Exited { code: Some(1) },
            });
        }
    }

    fn record(&self, command: FakeCommand) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.commands.push(command);
        if state.running.is_none() {
            return Err(BackendError::NotRunning);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn launch(&self, request: &LaunchRequest) -> BackendResult<LaunchHandle> {
        let mut state = self.state.lock();
        state.commands.push(FakeCommand::Launch(request.clone()));
        if state.failing_launches > 0 {
            state.failing_launches -= 1;
            return Err(BackendError::Launch("scripted launch failure".into()));
        }
        if state.running.is_some() {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        state.running = Some(request.generation);
        Ok(LaunchHandle {
            generation: request.generation,
            pid: None,
        })
    }

    async fn terminate(&self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.commands.push(FakeCommand::Terminate);
        if let Some(generation) = state.running.take() {
            let _ = self.events.send(BackendEvent {
                generation,
                kind: BackendEventKind::Exited { code: Some(0) },
            });
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    async fn set_pause(&self, paused: bool) -> BackendResult<()> {
        self.record(FakeCommand::SetPause(paused))
    }

    async fn seek(&self, position: f64) -> BackendResult<()> {
        self.record(FakeCommand::Seek(position))
    }

    async fn set_volume(&self, volume: u8) -> BackendResult<()> {
        self.record(FakeCommand::SetVolume(volume))
    }

    async fn set_geometry(&self, geometry: Geometry) -> BackendResult<()> {
        self.record(FakeCommand::SetGeometry(geometry))?;
        if self.state.lock().live_geometry_unsupported {
            return Err(BackendError::Unsupported("live geometry".into()));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}
