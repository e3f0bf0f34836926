//! Service configuration.
//!
//! [`Config`] is the single configuration object handed to
//! [`bootstrap_services`](crate::bootstrap::bootstrap_services). Every field
//! has a default suitable for a kiosk appliance; the server binary layers a
//! YAML file, environment and CLI overrides on top.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geometry::DisplayConfig;
use crate::protocol_constants::{MAX_DISPLAY_DIM, MIN_DIM, PRESETS_FILE};

/// Renderer process and IPC settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PlayerConfig {
    /// Renderer executable, resolved through `PATH` when not absolute.
    pub mpv_binary: PathBuf,

    /// Unix socket the renderer listens on for JSON IPC.
    pub socket_path: PathBuf,

    /// Directory local file names are resolved against.
    pub media_dir: PathBuf,

    /// Extra renderer arguments inserted before the source
    /// (e.g. `--vo=gpu`, `--gpu-context=x11egl`).
    pub extra_args: Vec<String>,

    /// Upper bound for a single IPC command round trip (milliseconds).
    pub command_timeout_ms: u64,

    /// Time between SIGTERM and SIGKILL when stopping (milliseconds).
    pub stop_grace_ms: u64,

    /// Socket connection attempts before a launch is declared failed.
    pub connect_attempts: u32,

    /// Delay between socket connection attempts (milliseconds).
    pub connect_retry_delay_ms: u64,
}

impl PlayerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.mpv_binary.as_os_str().is_empty() {
            return Err("player.mpv_binary must not be empty".to_string());
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err("player.socket_path must not be empty".to_string());
        }
        if self.command_timeout_ms == 0 {
            return Err("player.command_timeout_ms must be >= 1".to_string());
        }
        if self.connect_attempts == 0 {
            return Err("player.connect_attempts must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mpv_binary: PathBuf::from("mpv"),
            socket_path: PathBuf::from("/tmp/vidzone-mpv.sock"),
            media_dir: PathBuf::from("/var/lib/vidzone/media"),
            extra_args: Vec::new(),
            command_timeout_ms: 2000,
            stop_grace_ms: 2000,
            connect_attempts: 50,
            connect_retry_delay_ms: 100,
        }
    }
}

/// Live stream supervision settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Disables live stream supervision entirely when false.
    pub enabled: bool,

    /// Interval between health probes (seconds).
    pub probe_interval_secs: u64,

    /// Consecutive non-advancing probes before a stream counts as stalled.
    pub stall_probes: u32,

    /// Consecutive advancing probes that reset the restart backoff.
    pub healthy_probes: u32,

    /// First restart backoff (seconds); doubles per failed attempt.
    pub initial_backoff_secs: u64,

    /// Backoff ceiling (seconds).
    pub max_backoff_secs: u64,

    /// Restart attempts before giving up on a stream. `None` retries forever.
    pub max_restart_attempts: Option<u32>,
}

impl WatchdogConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_interval_secs == 0 {
            return Err("watchdog.probe_interval_secs must be >= 1".to_string());
        }
        if self.stall_probes == 0 || self.healthy_probes == 0 {
            return Err("watchdog.stall_probes and healthy_probes must be >= 1".to_string());
        }
        if self.initial_backoff_secs == 0 {
            return Err("watchdog.initial_backoff_secs must be >= 1".to_string());
        }
        if self.max_backoff_secs < self.initial_backoff_secs {
            return Err("watchdog.max_backoff_secs must be >= initial_backoff_secs".to_string());
        }
        if self.max_restart_attempts == Some(0) {
            return Err("watchdog.max_restart_attempts must be >= 1 when set".to_string());
        }
        Ok(())
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_interval_secs: 5,
            stall_probes: 2,
            healthy_probes: 3,
            initial_backoff_secs: 1,
            max_backoff_secs: 60,
            max_restart_attempts: None,
        }
    }
}

/// Configuration for the vidzone services.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Renderer process settings.
    pub player: PlayerConfig,

    /// Display resolution assumed at startup.
    pub display: DisplayConfig,

    /// Live stream watchdog settings.
    pub watchdog: WatchdogConfig,

    /// Directory holding durable state (the preset document).
    ///
    /// `None` keeps presets in memory only.
    pub data_dir: Option<PathBuf>,

    /// Capacity of the supervisor command queue. Callers wait when it is full.
    pub command_queue_capacity: usize,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Location of the preset document, if presets are persisted.
    pub fn presets_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(PRESETS_FILE))
    }

    /// Validates the whole configuration tree.
    pub fn validate(&self) -> Result<(), String> {
        self.player.validate()?;
        self.watchdog.validate()?;
        let in_range = |v: i32| (MIN_DIM..=MAX_DISPLAY_DIM).contains(&v);
        if !in_range(self.display.width) || !in_range(self.display.height) {
            return Err(format!(
                "display must be between {MIN_DIM} and {MAX_DISPLAY_DIM} pixels per axis, got {}",
                self.display
            ));
        }
        if self.command_queue_capacity == 0 {
            return Err("command_queue_capacity must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            display: DisplayConfig::default(),
            watchdog: WatchdogConfig::default(),
            data_dir: None,
            command_queue_capacity: 32,
            event_channel_capacity: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let config = Config {
            event_channel_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_ceiling_must_cover_initial_backoff() {
        let mut config = Config::default();
        config.watchdog.initial_backoff_secs = 10;
        config.watchdog.max_backoff_secs = 5;
        assert!(config.validate().unwrap_err().contains("max_backoff_secs"));
    }

    #[test]
    fn deserializes_partial_documents_with_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"player":{"extra_args":["--vo=gpu"]},"data_dir":"/srv/vz"}"#)
                .unwrap();
        assert_eq!(config.player.extra_args, vec!["--vo=gpu"]);
        assert_eq!(config.player.command_timeout_ms, 2000);
        assert_eq!(
            config.presets_path(),
            Some(PathBuf::from("/srv/vz/presets.json"))
        );
    }
}
