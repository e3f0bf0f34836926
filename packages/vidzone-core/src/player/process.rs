//! mpv subprocess backend.
//!
//! Each launch spawns a fresh `mpv` process with a JSON IPC socket, waits for
//! the socket to accept connections, registers property observers and then
//! forwards renderer events as [`BackendEvent`]s tagged with the launch
//! generation. A waiter task owns the child process and reports its exit.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ipc::{EventKind, IpcTransport, MediaEvent, TransportError};
use super::retry::with_fixed_retry;
use super::traits::{BackendError, BackendResult, MediaBackend};
use super::types::{BackendEvent, BackendEventKind, LaunchHandle, LaunchRequest};
use crate::geometry::Geometry;
use crate::protocol_constants::{GEOMETRY_PROPERTY, OBSERVED_PROPERTIES};
use crate::state::PlayerConfig;

/// Extra wait after SIGKILL before a terminate call gives up on the waiter.
const KILL_SETTLE: Duration = Duration::from_secs(1);

/// Buffered backend events before the supervisor's listener lags.
const BACKEND_EVENT_CAPACITY: usize = 256;

/// Builds the full mpv argument list for a launch request.
pub fn build_args(config: &PlayerConfig, request: &LaunchRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-border",
        "--no-osc",
        "--no-osd-bar",
        "--really-quiet",
        "--keep-open=yes",
        "--force-window=yes",
        "--idle=yes",
        "--ontop=yes",
        "--cursor-autohide=always",
        "--keepaspect=no",
        "--hwdec=auto",
        "--hwdec-codecs=all",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    args.push(format!("--geometry={}", request.geometry.to_window_spec()));
    args.push(format!(
        "--input-ipc-server={}",
        config.socket_path.display()
    ));
    args.push(format!("--volume={}", request.volume));
    args.push(format!(
        "--loop-playlist={}",
        if request.looped { "inf" } else { "no" }
    ));
    args.push("--cache=yes".to_string());
    args.push("--network-timeout=10".to_string());
    args.push("--rtsp-transport=tcp".to_string());

    if request.start_paused {
        args.push("--pause".to_string());
    }
    if let Some(position) = request.start_position.filter(|p| *p > 0.0) {
        args.push(format!("--start={position:.3}"));
    }

    args.extend(config.extra_args.iter().cloned());
    args.push("--".to_string());
    args.push(request.source.clone());
    args
}

/// The renderer instance currently owned by the backend.
struct ActiveRenderer {
    generation: u64,
    transport: Arc<IpcTransport>,
    alive: watch::Receiver<bool>,
    kill: CancellationToken,
    forwarder: JoinHandle<()>,
}

/// Production [`MediaBackend`] driving an `mpv` subprocess.
pub struct MpvBackend {
    config: PlayerConfig,
    active: Mutex<Option<ActiveRenderer>>,
    events: broadcast::Sender<BackendEvent>,
}

impl MpvBackend {
    pub fn new(config: PlayerConfig) -> Self {
        let (events, _) = broadcast::channel(BACKEND_EVENT_CAPACITY);
        Self {
            config,
            active: Mutex::new(None),
            events,
        }
    }

    fn transport(&self) -> BackendResult<Arc<IpcTransport>> {
        self.active
            .lock()
            .as_ref()
            .filter(|active| *active.alive.borrow())
            .map(|active| Arc::clone(&active.transport))
            .ok_or(BackendError::NotRunning)
    }

    async fn set_property(&self, name: &str, value: Value) -> BackendResult<()> {
        self.transport()?
            .send("set_property", vec![name.into(), value])
            .await?;
        Ok(())
    }

    /// Connects to the new renderer and registers property observers.
    async fn attach(
        &self,
        generation: u64,
        alive: &watch::Receiver<bool>,
    ) -> BackendResult<Arc<IpcTransport>> {
        let socket = self.config.socket_path.clone();
        let stream = with_fixed_retry(
            "IPC connect",
            self.config.connect_attempts,
            self.config.connect_retry_delay(),
            || (!*alive.borrow()).then(|| "renderer exited during startup".to_string()),
            || UnixStream::connect(&socket),
        )
        .await?;

        let transport = Arc::new(IpcTransport::new(stream, self.config.command_timeout()));
        for (id, name) in OBSERVED_PROPERTIES {
            transport
                .send("observe_property", vec![id.into(), name.into()])
                .await
                .map_err(|e| BackendError::Launch(format!("observe {name} failed: {e}")))?;
        }
        log::debug!(
            "[Mpv] Generation {} attached to {}",
            generation,
            socket.display()
        );
        Ok(transport)
    }
}

#[async_trait]
impl MediaBackend for MpvBackend {
    async fn launch(&self, request: &LaunchRequest) -> BackendResult<LaunchHandle> {
        self.terminate().await?;
        remove_stale_socket(&self.config.socket_path);

        let args = build_args(&self.config, request);
        log::info!(
            "[Mpv] Launching generation {} at {}: {}",
            request.generation,
            request.geometry,
            request.source
        );
        log::debug!("[Mpv] Arguments: {:?}", args);

        let child = Command::new(&self.config.mpv_binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackendError::Launch(format!(
                    "failed to spawn {}: {}",
                    self.config.mpv_binary.display(),
                    e
                ))
            })?;
        let pid = child.id();

        let (alive_tx, alive_rx) = watch::channel(true);
        let kill = CancellationToken::new();
        tokio::spawn(wait_for_exit(
            child,
            request.generation,
            alive_tx,
            kill.clone(),
            self.config.stop_grace(),
            self.events.clone(),
        ));

        let transport = match self.attach(request.generation, &alive_rx).await {
            Ok(transport) => transport,
            Err(e) => {
                log::warn!("[Mpv] Generation {} failed to start: {}", request.generation, e);
                kill.cancel();
                let mut alive = alive_rx;
                let _ = tokio::time::timeout(
                    self.config.stop_grace() + KILL_SETTLE,
                    alive.wait_for(|running| !*running),
                )
                .await;
                remove_stale_socket(&self.config.socket_path);
                return Err(e);
            }
        };

        let forwarder = tokio::spawn(forward_events(
            Arc::clone(&transport),
            request.generation,
            self.events.clone(),
        ));

        *self.active.lock() = Some(ActiveRenderer {
            generation: request.generation,
            transport,
            alive: alive_rx,
            kill,
            forwarder,
        });

        Ok(LaunchHandle {
            generation: request.generation,
            pid,
        })
    }

    async fn terminate(&self) -> BackendResult<()> {
        let Some(active) = self.active.lock().take() else {
            return Ok(());
        };

        log::info!("[Mpv] Terminating generation {}", active.generation);
        active.kill.cancel();
        let mut alive = active.alive.clone();
        let exited = tokio::time::timeout(
            self.config.stop_grace() + KILL_SETTLE,
            alive.wait_for(|running| !*running),
        )
        .await
        .is_ok();
        if !exited {
            log::error!(
                "[Mpv] Generation {} did not exit after SIGKILL",
                active.generation
            );
        }

        active.forwarder.abort();
        remove_stale_socket(&self.config.socket_path);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| *active.alive.borrow())
    }

    async fn set_pause(&self, paused: bool) -> BackendResult<()> {
        self.set_property("pause", paused.into()).await
    }

    async fn seek(&self, position: f64) -> BackendResult<()> {
        self.transport()?
            .send("seek", vec![position.into(), "absolute".into()])
            .await?;
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> BackendResult<()> {
        self.set_property("volume", volume.into()).await
    }

    async fn set_geometry(&self, geometry: Geometry) -> BackendResult<()> {
        match self
            .set_property(GEOMETRY_PROPERTY, geometry.to_window_spec().into())
            .await
        {
            Err(BackendError::Transport(TransportError::Command { message, .. })) => {
                Err(BackendError::Unsupported(format!("live geometry: {message}")))
            }
            other => other,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}

fn remove_stale_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::trace!("[Mpv] Removed socket {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("[Mpv] Could not remove {}: {}", path.display(), e),
    }
}

/// Owns the child process until it exits, either on its own or after the
/// kill token fires (SIGTERM, grace period, then SIGKILL).
async fn wait_for_exit(
    mut child: Child,
    generation: u64,
    alive: watch::Sender<bool>,
    kill: CancellationToken,
    grace: Duration,
    events: broadcast::Sender<BackendEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            send_sigterm(&child);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    log::warn!(
                        "[Mpv] Generation {} ignored SIGTERM for {:?}, killing",
                        generation,
                        grace
                    );
                    if let Err(e) = child.kill().await {
                        log::error!("[Mpv] Kill failed: {}", e);
                    }
                    child.wait().await
                }
            }
        }
    };

    let code = match status {
        Ok(status) => {
            log::info!("[Mpv] Generation {} exited: {}", generation, status);
            status.code()
        }
        Err(e) => {
            log::error!("[Mpv] Waiting on generation {} failed: {}", generation, e);
            None
        }
    };

    alive.send_replace(false);
    let _ = events.send(BackendEvent {
        generation,
        kind: BackendEventKind::Exited { code },
    });
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs to
    // a child we have not yet reaped, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        log::debug!(
            "[Mpv] SIGTERM to {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// Maps renderer IPC events onto backend events for one generation.
async fn forward_events(
    transport: Arc<IpcTransport>,
    generation: u64,
    events: broadcast::Sender<BackendEvent>,
) {
    let mut stream = futures::stream::select(
        transport.subscribe(EventKind::PropertyChange).boxed(),
        transport.subscribe(EventKind::EndFile).boxed(),
    );
    // Only the streams need the connection from here on.
    drop(transport);

    while let Some(event) = stream.next().await {
        if let Some(kind) = map_event(event) {
            let _ = events.send(BackendEvent { generation, kind });
        }
    }
    log::trace!("[Mpv] Event forwarding for generation {} ended", generation);
}

fn map_event(event: MediaEvent) -> Option<BackendEventKind> {
    match event {
        MediaEvent::PropertyChange { name, data, .. } => match name.as_str() {
            "time-pos" => data.as_f64().map(BackendEventKind::Position),
            "duration" => Some(BackendEventKind::Duration(data.as_f64())),
            "pause" => data.as_bool().map(BackendEventKind::Paused),
            _ => None,
        },
        MediaEvent::EndFile { reason } => Some(BackendEventKind::EndOfStream { reason }),
    }
}
