//! Live stream watchdog.
//!
//! A periodic probe reads supervisor snapshots and judges a live stream by
//! two signals: the renderer is alive, and the playback position advanced
//! since the previous probe. A stream that stops advancing for
//! `stall_probes` probes, or whose renderer dies, is restarted through the
//! supervisor's queue.
//!
//! ```text
//! Healthy ──no advance──▶ Suspect ──N probes / death──▶ Restarting
//!    ▲                       │                              │
//!    └────────advance────────┘◀───────restart issued────────┘
//! ```
//!
//! The first restart after confirmed health is immediate. Each further
//! failure (a restart error, or stalling again before `healthy_probes`
//! advancing probes confirm recovery) waits the current backoff, which then
//! doubles up to `max_backoff`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, WatchdogEvent};
use crate::state::WatchdogConfig;
use crate::utils::{is_live_stream, now_millis};

use super::supervisor::{PlaybackStatus, PlayerSupervisor, Probe, TrackedStream};

/// Position change below this is treated as no progress.
const ADVANCE_EPSILON_SECS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    Idle,
    Healthy,
    Suspect,
    Restarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallReason {
    NoProgress,
    RendererDied,
    /// The renderer reached end of file on a live source.
    StreamEnded,
}

impl StallReason {
    fn describe(self) -> &'static str {
        match self {
            Self::NoProgress => "position stopped advancing",
            Self::RendererDied => "renderer exited",
            Self::StreamEnded => "stream ended",
        }
    }
}

/// Something the service loop must act on.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchdogAction {
    Stalled {
        source: String,
        reason: StallReason,
    },
    Restart {
        stream: TrackedStream,
        attempt: u32,
        epoch: u64,
    },
    Recovered {
        source: String,
    },
    GiveUp {
        stream: TrackedStream,
        attempts: u32,
    },
}

/// Result of a restart submitted to the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum RestartOutcome {
    Launched,
    Failed(String),
    /// The user started or stopped something in the meantime.
    Superseded,
}

/// Pure watchdog state machine; the service loop feeds it probes and time.
#[derive(Debug)]
pub struct WatchdogMachine {
    stall_probes: u32,
    healthy_probes: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    max_restart_attempts: Option<u32>,

    phase: WatchdogPhase,
    stream: Option<TrackedStream>,
    last_position: Option<f64>,
    stalled_probes: u32,
    advancing_probes: u32,
    consecutive_failures: u32,
    backoff: Duration,
    next_retry_at: Option<Instant>,
    /// A restart was issued and recovery is not yet confirmed.
    awaiting_confirmation: bool,
    /// Restarts issued since the stream was last confirmed healthy.
    attempts: u32,
    /// Bumped on reset so results of restarts issued earlier are discarded.
    epoch: u64,
}

impl WatchdogMachine {
    pub fn new(config: &WatchdogConfig) -> Self {
        Self {
            stall_probes: config.stall_probes.max(1),
            healthy_probes: config.healthy_probes.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            max_restart_attempts: config.max_restart_attempts,
            phase: WatchdogPhase::Idle,
            stream: None,
            last_position: None,
            stalled_probes: 0,
            advancing_probes: 0,
            consecutive_failures: 0,
            backoff: config.initial_backoff(),
            next_retry_at: None,
            awaiting_confirmation: false,
            attempts: 0,
            epoch: 0,
        }
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.phase
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn next_retry_at(&self) -> Option<Instant> {
        self.next_retry_at
    }

    pub fn tracked(&self) -> Option<&TrackedStream> {
        self.stream.as_ref()
    }

    /// Forgets the tracked stream and cancels any pending retry.
    pub fn reset(&mut self) {
        self.phase = WatchdogPhase::Idle;
        self.stream = None;
        self.last_position = None;
        self.stalled_probes = 0;
        self.advancing_probes = 0;
        self.consecutive_failures = 0;
        self.backoff = self.initial_backoff;
        self.next_retry_at = None;
        self.awaiting_confirmation = false;
        self.attempts = 0;
        self.epoch += 1;
    }

    /// Evaluates one probe.
    pub fn on_probe(&mut self, probe: &Probe, now: Instant) -> Vec<WatchdogAction> {
        let state = &probe.state;
        let live_source = state
            .source
            .as_deref()
            .filter(|source| is_live_stream(source));

        if let Some(stream) = &self.stream {
            if state.session != stream.session {
                log::debug!("[Watchdog] Session changed, dropping tracked stream");
                self.reset();
            }
        }

        let Some(stream) = self.stream.clone() else {
            if let (Some(source), true) = (live_source, state.status.is_active()) {
                log::info!("[Watchdog] Supervising {}", source);
                self.stream = Some(TrackedStream {
                    source: source.to_string(),
                    looped: state.looped,
                    volume: state.volume,
                    geometry: state.geometry,
                    session: state.session,
                });
                self.phase = WatchdogPhase::Healthy;
                self.last_position = Some(state.position);
                return Vec::new();
            }
            // Died before it was ever seen running.
            return match state.last_exit.as_ref() {
                Some(crashed) if crashed.session == state.session => {
                    log::info!("[Watchdog] Supervising {} after renderer exit", crashed.source);
                    self.stream = Some(crashed.clone());
                    self.enter_restarting(crashed, StallReason::RendererDied, now)
                }
                _ => Vec::new(),
            };
        };

        // Waiting for a scheduled retry; nothing to judge until it fires.
        if self.next_retry_at.is_some() {
            return Vec::new();
        }

        if !state.status.is_active() || !probe.renderer_alive {
            return self.enter_restarting(&stream, StallReason::RendererDied, now);
        }

        // Follow live volume and geometry changes.
        if let Some(tracked) = self.stream.as_mut() {
            tracked.volume = state.volume;
            tracked.geometry = state.geometry;
            tracked.looped = state.looped;
        }

        // With keep-open the renderer idles paused on the last frame.
        if state.ended {
            return self.enter_restarting(&stream, StallReason::StreamEnded, now);
        }

        if state.status == PlaybackStatus::Paused {
            self.last_position = Some(state.position);
            return Vec::new();
        }

        let Some(previous) = self.last_position.replace(state.position) else {
            return Vec::new();
        };

        if state.position > previous + ADVANCE_EPSILON_SECS {
            self.on_advance(&stream)
        } else {
            self.advancing_probes = 0;
            self.stalled_probes += 1;
            self.phase = WatchdogPhase::Suspect;
            log::debug!(
                "[Watchdog] {} did not advance ({}/{})",
                stream.source,
                self.stalled_probes,
                self.stall_probes
            );
            if self.stalled_probes >= self.stall_probes {
                self.enter_restarting(&stream, StallReason::NoProgress, now)
            } else {
                Vec::new()
            }
        }
    }

    fn on_advance(&mut self, stream: &TrackedStream) -> Vec<WatchdogAction> {
        self.stalled_probes = 0;
        self.advancing_probes += 1;
        self.phase = WatchdogPhase::Healthy;

        if self.advancing_probes < self.healthy_probes {
            return Vec::new();
        }

        let recovered = self.awaiting_confirmation;
        self.awaiting_confirmation = false;
        self.consecutive_failures = 0;
        self.attempts = 0;
        self.backoff = self.initial_backoff;

        if recovered {
            log::info!("[Watchdog] {} recovered", stream.source);
            vec![WatchdogAction::Recovered {
                source: stream.source.clone(),
            }]
        } else {
            Vec::new()
        }
    }

    fn enter_restarting(
        &mut self,
        stream: &TrackedStream,
        reason: StallReason,
        now: Instant,
    ) -> Vec<WatchdogAction> {
        log::warn!(
            "[Watchdog] {} unhealthy: {}",
            stream.source,
            reason.describe()
        );
        self.phase = WatchdogPhase::Restarting;
        self.stalled_probes = 0;
        self.advancing_probes = 0;
        self.last_position = None;

        if self.awaiting_confirmation {
            self.schedule_after_failure(now);
        } else {
            self.next_retry_at = Some(now);
        }

        vec![WatchdogAction::Stalled {
            source: stream.source.clone(),
            reason,
        }]
    }

    fn schedule_after_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.next_retry_at = Some(now + self.backoff);
        log::info!(
            "[Watchdog] Retrying in {:?} (failure {})",
            self.backoff,
            self.consecutive_failures
        );
        self.backoff = (self.backoff * 2).min(self.max_backoff);
    }

    /// Issues the pending restart once it is due.
    pub fn poll_retry(&mut self, now: Instant) -> Option<WatchdogAction> {
        let due = self.next_retry_at.is_some_and(|at| at <= now);
        if !due {
            return None;
        }
        self.next_retry_at = None;
        let stream = self.stream.clone()?;

        if self
            .max_restart_attempts
            .is_some_and(|cap| self.attempts >= cap)
        {
            let attempts = self.attempts;
            self.reset();
            return Some(WatchdogAction::GiveUp { stream, attempts });
        }

        self.attempts += 1;
        self.awaiting_confirmation = true;
        Some(WatchdogAction::Restart {
            stream,
            attempt: self.attempts,
            epoch: self.epoch,
        })
    }

    /// Records the supervisor's answer to a restart issued in `epoch`.
    pub fn on_restart_result(&mut self, epoch: u64, outcome: &RestartOutcome, now: Instant) {
        if epoch != self.epoch {
            return;
        }
        match outcome {
            RestartOutcome::Launched => {
                self.phase = WatchdogPhase::Healthy;
                self.last_position = None;
            }
            RestartOutcome::Failed(error) => {
                log::warn!("[Watchdog] Restart failed: {}", error);
                self.schedule_after_failure(now);
            }
            RestartOutcome::Superseded => self.reset(),
        }
    }
}

/// Periodic task driving a [`WatchdogMachine`] against the supervisor.
#[derive(Clone)]
pub struct StreamWatchdog {
    machine: Arc<Mutex<WatchdogMachine>>,
    supervisor: PlayerSupervisor,
    emitter: Arc<dyn EventEmitter>,
    probe_interval: Duration,
}

impl StreamWatchdog {
    pub fn new(
        config: &WatchdogConfig,
        supervisor: PlayerSupervisor,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            machine: Arc::new(Mutex::new(WatchdogMachine::new(config))),
            supervisor,
            emitter,
            probe_interval: config.probe_interval(),
        }
    }

    /// Cancels any pending retry and forgets the tracked stream.
    ///
    /// Called on every user play or stop.
    pub fn reset(&self) {
        self.machine.lock().reset();
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.machine.lock().phase()
    }

    /// Runs until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        log::info!(
            "[Watchdog] Started (probe every {:?})",
            self.probe_interval
        );
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let retry_at = self.machine.lock().next_retry_at();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let probe = self.supervisor.probe();
                    let actions = self.machine.lock().on_probe(&probe, Instant::now());
                    for action in actions {
                        self.execute(action).await;
                    }
                }
                _ = sleep_until_opt(retry_at) => {}
            }

            let due = self.machine.lock().poll_retry(Instant::now());
            if let Some(action) = due {
                self.execute(action).await;
            }
        }
        log::info!("[Watchdog] Stopped");
    }

    async fn execute(&self, action: WatchdogAction) {
        let timestamp = now_millis();
        match action {
            WatchdogAction::Stalled { source, reason } => {
                self.emitter.emit_watchdog(WatchdogEvent::Stalled {
                    source,
                    reason: reason.describe().to_string(),
                    timestamp,
                });
            }
            WatchdogAction::Recovered { source } => {
                self.emitter
                    .emit_watchdog(WatchdogEvent::Recovered { source, timestamp });
            }
            WatchdogAction::Restart {
                stream,
                attempt,
                epoch,
            } => {
                log::info!(
                    "[Watchdog] Restarting {} (attempt {})",
                    stream.source,
                    attempt
                );
                let source = stream.source.clone();
                let outcome = match self.supervisor.restart(stream).await {
                    Ok(()) => RestartOutcome::Launched,
                    Err(e) if e.code() == "invalid_state" => RestartOutcome::Superseded,
                    Err(e) => RestartOutcome::Failed(e.to_string()),
                };
                self.emitter.emit_watchdog(WatchdogEvent::RestartAttempted {
                    source,
                    attempt,
                    error: match &outcome {
                        RestartOutcome::Failed(e) => Some(e.clone()),
                        _ => None,
                    },
                    timestamp,
                });
                self.machine
                    .lock()
                    .on_restart_result(epoch, &outcome, Instant::now());
            }
            WatchdogAction::GiveUp { stream, attempts } => {
                log::error!(
                    "[Watchdog] Giving up on {} after {} restart(s)",
                    stream.source,
                    attempts
                );
                match self.supervisor.stop_session(stream.session).await {
                    Ok(_) => {}
                    Err(e) => log::warn!("[Watchdog] Stopping abandoned stream failed: {}", e),
                }
                self.emitter.emit_watchdog(WatchdogEvent::GaveUp {
                    source: stream.source,
                    attempts,
                    timestamp,
                });
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
