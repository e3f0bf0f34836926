//! Control facade: the call surface an HTTP layer binds to.
//!
//! Every operation returns a serializable response (camelCase) or a
//! [`VidzoneError`] carrying a stable code and status number. The facade adds
//! the cross-service rules: default preset application on play, applying a
//! loaded preset to the player, and resetting the watchdog on user play/stop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::{VidzoneError, VidzoneResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge};
use crate::geometry::{DisplayConfig, Geometry};
use crate::media::{MediaFile, MediaLibrary};
use crate::protocol_constants::DEFAULT_LOOP;

use super::preset_store::{Preset, PresetList, PresetStore};
use super::supervisor::{
    clamp_volume, PlayRequest, PlaybackStatus, PlayerState, PlayerSupervisor, SeekTarget,
};
use super::watchdog::StreamWatchdog;

// ─────────────────────────────────────────────────────────────────────────────
// Requests & Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters of a play call. Omitted fields take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayParams {
    pub source: String,
    #[serde(default, rename = "loop")]
    pub looped: Option<bool>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl PlayParams {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    pub status: PlaybackStatus,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: PlaybackStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeResponse {
    pub volume: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryResponse {
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayResponse {
    pub width: i32,
    pub height: i32,
    /// Zone geometry after re-fitting to the display.
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub player: PlaybackStatus,
    pub renderer_alive: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// Facade over the supervisor, preset store, watchdog and media library.
#[derive(Clone)]
pub struct PlayerController {
    supervisor: PlayerSupervisor,
    presets: Arc<PresetStore>,
    watchdog: StreamWatchdog,
    media: MediaLibrary,
    events: Arc<BroadcastEventBridge>,
}

impl PlayerController {
    pub fn new(
        supervisor: PlayerSupervisor,
        presets: Arc<PresetStore>,
        watchdog: StreamWatchdog,
        media: MediaLibrary,
        events: Arc<BroadcastEventBridge>,
    ) -> Self {
        Self {
            supervisor,
            presets,
            watchdog,
            media,
            events,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────────────

    /// Starts playback.
    ///
    /// Without an explicit geometry the default preset is used when one is
    /// designated; otherwise the current geometry is kept. Without a volume
    /// the last set volume applies (50 on a fresh start).
    pub async fn play(&self, params: PlayParams) -> VidzoneResult<PlayResponse> {
        let geometry = params.geometry.or_else(|| {
            self.presets.default_preset().map(|preset| {
                log::debug!("[Controller] Using default preset '{}'", preset.name);
                preset.geometry
            })
        });

        let result = self
            .supervisor
            .play(PlayRequest {
                source: params.source,
                looped: params.looped.unwrap_or(DEFAULT_LOOP),
                volume: params
                    .volume
                    .map_or_else(|| self.supervisor.status().volume, clamp_volume),
                geometry,
            })
            .await;
        self.watchdog.reset();

        let state = result?;
        Ok(PlayResponse {
            status: state.status,
            source: state.source,
        })
    }

    pub async fn stop(&self) -> VidzoneResult<StatusResponse> {
        let result = self.supervisor.stop().await;
        self.watchdog.reset();
        Ok(StatusResponse {
            status: result?.status,
        })
    }

    /// Toggles pause.
    pub async fn pause(&self) -> VidzoneResult<StatusResponse> {
        let status = self.supervisor.toggle_pause().await?;
        Ok(StatusResponse { status })
    }

    pub async fn seek(&self, position: f64) -> VidzoneResult<PositionResponse> {
        let position = self.supervisor.seek(SeekTarget::Absolute(position)).await?;
        Ok(PositionResponse { position })
    }

    pub async fn seek_relative(&self, delta: f64) -> VidzoneResult<PositionResponse> {
        let position = self.supervisor.seek(SeekTarget::Relative(delta)).await?;
        Ok(PositionResponse { position })
    }

    pub async fn set_volume(&self, volume: i64) -> VidzoneResult<VolumeResponse> {
        let volume = self.supervisor.set_volume(volume).await?;
        Ok(VolumeResponse { volume })
    }

    /// Fits the requested zone to the display and applies it.
    pub async fn set_geometry(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> VidzoneResult<GeometryResponse> {
        let geometry = self
            .supervisor
            .set_geometry(Geometry::new(x, y, width, height))
            .await?;
        Ok(GeometryResponse { geometry })
    }

    pub fn get_status(&self) -> PlayerState {
        self.supervisor.status()
    }

    pub async fn set_display_resolution(
        &self,
        width: i32,
        height: i32,
    ) -> VidzoneResult<DisplayResponse> {
        let display = DisplayConfig::new(width, height)?;
        let geometry = self.supervisor.set_display(display).await?;
        Ok(DisplayResponse {
            width,
            height,
            geometry,
        })
    }

    pub fn get_display_resolution(&self) -> DisplayConfig {
        self.supervisor.display()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Presets
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_presets(&self) -> PresetList {
        self.presets.list()
    }

    pub fn save_preset(
        &self,
        name: &str,
        geometry: Geometry,
        description: &str,
    ) -> VidzoneResult<Preset> {
        Ok(self.presets.save(name, geometry, description)?)
    }

    /// Applies a preset to the player and returns its stored geometry.
    ///
    /// The player receives the geometry fitted to the current display; the
    /// response carries the preset exactly as stored.
    pub async fn load_preset(&self, name: &str) -> VidzoneResult<GeometryResponse> {
        let geometry = self.presets.load(name)?;
        self.supervisor.set_geometry(geometry).await?;
        log::info!("[Controller] Applied preset '{}'", name.trim());
        Ok(GeometryResponse { geometry })
    }

    pub fn delete_preset(&self, name: &str) -> VidzoneResult<()> {
        Ok(self.presets.delete(name)?)
    }

    pub fn set_default_preset(&self, name: &str) -> VidzoneResult<()> {
        Ok(self.presets.set_default(name)?)
    }

    pub fn clear_default_preset(&self) -> VidzoneResult<()> {
        Ok(self.presets.clear_default()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Media, health, events
    // ─────────────────────────────────────────────────────────────────────

    pub async fn list_media(&self) -> VidzoneResult<Vec<MediaFile>> {
        self.media.list().await.map_err(VidzoneError::from)
    }

    pub fn health(&self) -> HealthResponse {
        let probe = self.supervisor.probe();
        HealthResponse {
            status: "ok",
            player: probe.state.status,
            renderer_alive: probe.renderer_alive,
        }
    }

    /// Receiver for every domain event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventEmitter, PresetEvent};
    use crate::player::fake::FakeBackend;
    use crate::runtime::TokioSpawner;
    use crate::services::supervisor::SupervisorConfig;
    use crate::state::WatchdogConfig;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        controller: PlayerController,
        backend: Arc<FakeBackend>,
        cancel: CancellationToken,
        _media: tempfile::TempDir,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn harness() -> Harness {
        let media = tempfile::tempdir().unwrap();
        std::fs::write(media.path().join("lobby.mp4"), b"video").unwrap();
        std::fs::write(media.path().join("menu.webm"), b"video").unwrap();
        std::fs::write(media.path().join("notes.txt"), b"text").unwrap();

        let backend = Arc::new(FakeBackend::new());
        let bridge = Arc::new(BroadcastEventBridge::new(32));
        let emitter: Arc<dyn EventEmitter> = bridge.clone();
        let cancel = CancellationToken::new();
        let library = MediaLibrary::new(media.path());
        let supervisor = PlayerSupervisor::start(
            backend.clone(),
            library.clone(),
            Arc::clone(&emitter),
            SupervisorConfig {
                display: DisplayConfig::default(),
                queue_capacity: 8,
            },
            cancel.clone(),
            &TokioSpawner::current(),
        );
        let watchdog = StreamWatchdog::new(
            &WatchdogConfig::default(),
            supervisor.clone(),
            Arc::clone(&emitter),
        );
        let presets = Arc::new(PresetStore::open(None, emitter));

        Harness {
            controller: PlayerController::new(supervisor, presets, watchdog, library, bridge),
            backend,
            cancel,
            _media: media,
        }
    }

    #[tokio::test]
    async fn play_without_geometry_or_default_fills_the_display() {
        let h = harness();
        let response = h.controller.play(PlayParams::new("lobby.mp4")).await.unwrap();

        assert_eq!(response.status, PlaybackStatus::Playing);
        assert_eq!(response.source.as_deref(), Some("lobby.mp4"));
        let state = h.controller.get_status();
        assert_eq!(state.geometry, Geometry::new(0, 0, 1920, 1080));
        assert!(state.looped);
        assert_eq!(state.volume, 50);
    }

    #[tokio::test]
    async fn default_preset_is_applied_on_play_idempotently() {
        let h = harness();
        h.controller.set_default_preset("corner-pip").unwrap();

        h.controller.play(PlayParams::new("lobby.mp4")).await.unwrap();
        let first = h.controller.get_status().geometry;
        h.controller.play(PlayParams::new("lobby.mp4")).await.unwrap();
        let second = h.controller.get_status().geometry;

        assert_eq!(first, Geometry::new(1280, 720, 640, 360));
        assert_eq!(first, second);
        let launches = h.backend.launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(launches[0].geometry, launches[1].geometry);
    }

    #[tokio::test]
    async fn explicit_geometry_wins_over_default_preset() {
        let h = harness();
        h.controller.set_default_preset("left-half").unwrap();

        let params = PlayParams {
            geometry: Some(Geometry::new(100, 100, 800, 450)),
            ..PlayParams::new("lobby.mp4")
        };
        h.controller.play(params).await.unwrap();

        assert_eq!(
            h.controller.get_status().geometry,
            Geometry::new(100, 100, 800, 450)
        );
    }

    #[tokio::test]
    async fn play_clamps_volume_and_honours_loop_flag() {
        let h = harness();
        let params = PlayParams {
            looped: Some(false),
            volume: Some(250),
            ..PlayParams::new("menu.webm")
        };
        h.controller.play(params).await.unwrap();

        let launch = &h.backend.launches()[0];
        assert_eq!(launch.volume, 100);
        assert!(!launch.looped);
        assert_eq!(h.controller.set_volume(-3).await.unwrap().volume, 0);
    }

    #[tokio::test]
    async fn volume_set_while_stopped_applies_to_next_play() {
        let h = harness();
        h.controller.set_volume(20).await.unwrap();
        h.controller.play(PlayParams::new("lobby.mp4")).await.unwrap();
        assert_eq!(h.backend.launches()[0].volume, 20);
    }

    #[tokio::test]
    async fn play_of_missing_file_is_not_found() {
        let h = harness();
        let err = h
            .controller
            .play(PlayParams::new("missing.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.status_code(), 404);
        assert!(h.backend.launches().is_empty());
    }

    #[tokio::test]
    async fn set_geometry_clamps_into_the_display() {
        let h = harness();
        let response = h.controller.set_geometry(1800, 900, 400, 400).await.unwrap();
        assert_eq!(response.geometry, Geometry::new(1520, 680, 400, 400));

        let in_bounds = h.controller.set_geometry(10, 20, 640, 360).await.unwrap();
        assert_eq!(in_bounds.geometry, Geometry::new(10, 20, 640, 360));
    }

    #[tokio::test]
    async fn undersized_geometry_is_rejected() {
        let h = harness();
        let err = h.controller.set_geometry(0, 0, 50, 400).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn load_preset_applies_fitted_geometry_and_returns_stored_one() {
        let h = harness();
        h.controller.set_display_resolution(1280, 720).await.unwrap();

        let response = h.controller.load_preset("fullscreen").await.unwrap();

        assert_eq!(response.geometry, Geometry::new(0, 0, 1920, 1080));
        assert_eq!(
            h.controller.get_status().geometry,
            Geometry::new(0, 0, 1280, 720)
        );
    }

    #[tokio::test]
    async fn saved_preset_round_trips_through_load() {
        let h = harness();
        let geometry = Geometry::new(40, 60, 700, 400);
        h.controller
            .save_preset("  signage  ", geometry, "Signage strip")
            .unwrap();

        let response = h.controller.load_preset("signage").await.unwrap();
        assert_eq!(response.geometry, geometry);
        assert_eq!(h.controller.get_status().geometry, geometry);
    }

    #[tokio::test]
    async fn deleting_the_default_preset_clears_it() {
        let h = harness();
        let mut events = h.controller.subscribe();
        h.controller.set_default_preset("top-half").unwrap();
        h.controller.delete_preset("top-half").unwrap();

        assert_eq!(h.controller.list_presets().default, None);
        let err = h.controller.load_preset("top-half").await.unwrap_err();
        assert_eq!(err.code(), "not_found");

        let mut default_changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let BroadcastEvent::Preset(PresetEvent::DefaultChanged { name, .. }) = event {
                default_changes.push(name);
            }
        }
        assert_eq!(default_changes, vec![Some("top-half".to_string()), None]);
    }

    #[tokio::test]
    async fn pause_and_seek_require_playback() {
        let h = harness();
        assert_eq!(h.controller.pause().await.unwrap_err().code(), "invalid_state");
        assert_eq!(h.controller.seek(5.0).await.unwrap_err().code(), "invalid_state");

        h.controller.play(PlayParams::new("lobby.mp4")).await.unwrap();
        assert_eq!(
            h.controller.pause().await.unwrap().status,
            PlaybackStatus::Paused
        );
    }

    #[tokio::test]
    async fn display_resolution_is_validated() {
        let h = harness();
        let err = h
            .controller
            .set_display_resolution(50, 1080)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(h.controller.get_display_resolution(), DisplayConfig::default());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_health_tracks_renderer() {
        let h = harness();
        h.controller.play(PlayParams::new("lobby.mp4")).await.unwrap();
        let health = h.controller.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.player, PlaybackStatus::Playing);
        assert!(health.renderer_alive);

        for _ in 0..2 {
            let stopped = h.controller.stop().await.unwrap();
            assert_eq!(stopped.status, PlaybackStatus::Stopped);
        }
        assert!(!h.controller.health().renderer_alive);
        assert_eq!(h.controller.get_status().source, None);
    }

    #[tokio::test]
    async fn rapid_plays_never_overlap_renderers() {
        let h = harness();
        for source in ["lobby.mp4", "menu.webm", "lobby.mp4", "menu.webm"] {
            h.controller.play(PlayParams::new(source)).await.unwrap();
        }
        assert_eq!(h.backend.launches().len(), 4);
        assert_eq!(h.backend.overlaps(), 0);
    }

    #[tokio::test]
    async fn list_media_filters_by_extension() {
        let h = harness();
        let names: Vec<_> = h
            .controller
            .list_media()
            .await
            .unwrap()
            .into_iter()
            .map(|file| file.name)
            .collect();
        assert_eq!(names, vec!["lobby.mp4", "menu.webm"]);
    }

    #[test]
    fn play_params_accept_loop_key() {
        let params: PlayParams =
            serde_json::from_str(r#"{"source":"rtsp://cam/1","loop":false,"volume":20}"#).unwrap();
        assert_eq!(params.looped, Some(false));
        assert_eq!(params.volume, Some(20));
        assert!(params.geometry.is_none());
    }
}
