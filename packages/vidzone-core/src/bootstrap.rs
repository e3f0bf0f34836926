//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root: the single place where all
//! services are instantiated and wired together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{VidzoneError, VidzoneResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::media::MediaLibrary;
use crate::player::{MediaBackend, MpvBackend};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{
    PlayerController, PlayerSupervisor, PresetStore, StreamWatchdog, SupervisorConfig,
};
use crate::state::Config;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Facade for the outer API layer.
    pub controller: PlayerController,
    /// Owner of the renderer and the player state.
    pub supervisor: PlayerSupervisor,
    /// Durable geometry presets.
    pub presets: Arc<PresetStore>,
    /// Live stream watchdog (already running unless disabled).
    pub watchdog: StreamWatchdog,
    /// Event bridge for subscribers and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    ///
    /// Stops playback, then cancels the background tasks.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.watchdog.reset();
        if let Err(e) = self.supervisor.stop().await {
            log::warn!("[Bootstrap] Stopping playback failed: {}", e);
        }
        self.cancel_token.cancel();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services with the mpv backend.
///
/// # Errors
///
/// Returns [`VidzoneError::Validation`] if the configuration is invalid.
pub fn bootstrap_services(config: &Config) -> VidzoneResult<BootstrappedServices> {
    let backend = Arc::new(MpvBackend::new(config.player.clone()));
    bootstrap_with_backend(config, backend)
}

/// Bootstraps all services around the given renderer backend.
///
/// Wiring order:
///
/// 1. Shared infrastructure (spawner, cancellation token, event bridge)
/// 2. Supervisor (depends on backend, media library, event bridge)
/// 3. Preset store (depends on event bridge)
/// 4. Watchdog (depends on supervisor), started if enabled
/// 5. Controller facade (depends on all of the above)
///
/// Must be called from within a Tokio runtime.
pub fn bootstrap_with_backend(
    config: &Config,
    backend: Arc<dyn MediaBackend>,
) -> VidzoneResult<BootstrappedServices> {
    config.validate().map_err(VidzoneError::Validation)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    let emitter: Arc<dyn EventEmitter> = event_bridge.clone();

    let media = MediaLibrary::new(&config.player.media_dir);

    let supervisor = PlayerSupervisor::start(
        backend,
        media.clone(),
        Arc::clone(&emitter),
        SupervisorConfig {
            display: config.display,
            queue_capacity: config.command_queue_capacity,
        },
        cancel_token.clone(),
        &spawner,
    );

    let presets = Arc::new(PresetStore::open(
        config.presets_path(),
        Arc::clone(&emitter),
    ));

    let watchdog = StreamWatchdog::new(&config.watchdog, supervisor.clone(), emitter);
    if config.watchdog.enabled {
        spawner.spawn(watchdog.clone().run(cancel_token.clone()));
    } else {
        log::info!("[Bootstrap] Stream watchdog disabled");
    }

    let controller = PlayerController::new(
        supervisor.clone(),
        Arc::clone(&presets),
        watchdog.clone(),
        media,
        Arc::clone(&event_bridge),
    );

    log::info!(
        "[Bootstrap] Services ready (display {}, media {})",
        config.display,
        config.player.media_dir.display()
    );

    Ok(BootstrappedServices {
        controller,
        supervisor,
        presets,
        watchdog,
        event_bridge,
        spawner,
        cancel_token,
    })
}
