//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//!
//! ```yaml
//! mpv_binary: /usr/bin/mpv
//! media_dir: /var/lib/vidzone/media
//! mpv_extra_args: ["--vo=gpu", "--gpu-context=x11egl"]
//! display: { width: 1920, height: 1080 }
//! watchdog: { probe_interval_secs: 5, max_backoff_secs: 60 }
//! startup:
//!   source: rtsp://10.0.0.8:554/stream1
//!   loop: false
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use vidzone_core::{DisplayConfig, PlayerConfig, WatchdogConfig};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// mpv executable.
    /// Override: `VIDZONE_MPV_BINARY`
    pub mpv_binary: PathBuf,

    /// IPC socket mpv listens on.
    /// Override: `VIDZONE_SOCKET_PATH`
    pub socket_path: PathBuf,

    /// Directory local media names are resolved against.
    /// Override: `VIDZONE_MEDIA_DIR`
    pub media_dir: PathBuf,

    /// Extra mpv flags, e.g. video output selection.
    /// Override: `VIDZONE_MPV_EXTRA_ARGS` (whitespace separated)
    pub mpv_extra_args: Vec<String>,

    /// Display resolution at startup.
    /// Override: `VIDZONE_DISPLAY` (`WIDTHxHEIGHT`)
    pub display: DisplayConfig,

    /// Live stream watchdog settings.
    pub watchdog: WatchdogConfig,

    /// Directory for persistent data (presets).
    /// Override: `VIDZONE_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Source played once after startup.
    pub startup: Option<StartupConfig>,
}

/// Content to play as soon as the services are up.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StartupConfig {
    pub source: String,
    #[serde(default, rename = "loop")]
    pub looped: Option<bool>,
    #[serde(default)]
    pub volume: Option<i64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let player = PlayerConfig::default();
        Self {
            mpv_binary: player.mpv_binary,
            socket_path: player.socket_path,
            media_dir: player.media_dir,
            mpv_extra_args: player.extra_args,
            display: DisplayConfig::default(),
            watchdog: WatchdogConfig::default(),
            data_dir: None,
            startup: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VIDZONE_MPV_BINARY") {
            self.mpv_binary = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("VIDZONE_SOCKET_PATH") {
            self.socket_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("VIDZONE_MPV_EXTRA_ARGS") {
            self.mpv_extra_args = val.split_whitespace().map(str::to_string).collect();
        }

        if let Ok(val) = std::env::var("VIDZONE_DISPLAY") {
            match parse_display(&val) {
                Ok(display) => self.display = display,
                Err(e) => log::warn!("Ignoring VIDZONE_DISPLAY: {}", e),
            }
        }

        // Note: VIDZONE_MEDIA_DIR and VIDZONE_DATA_DIR are handled by clap
        // via #[arg(env = ...)] in main.rs
    }

    /// Converts to vidzone-core's Config type.
    pub fn to_core_config(&self) -> vidzone_core::Config {
        vidzone_core::Config {
            player: PlayerConfig {
                mpv_binary: self.mpv_binary.clone(),
                socket_path: self.socket_path.clone(),
                media_dir: self.media_dir.clone(),
                extra_args: self.mpv_extra_args.clone(),
                ..Default::default()
            },
            display: self.display,
            watchdog: self.watchdog.clone(),
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }
}

/// Parses a `WIDTHxHEIGHT` display resolution.
pub fn parse_display(value: &str) -> Result<DisplayConfig, String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = width
        .parse()
        .map_err(|_| format!("invalid display width '{width}'"))?;
    let height = height
        .parse()
        .map_err(|_| format!("invalid display height '{height}'"))?;
    DisplayConfig::new(width, height).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_defaults_and_keeps_the_rest() {
        let config = ServerConfig::parse(
            r#"
media_dir: /srv/media
mpv_extra_args: ["--vo=gpu"]
display: { width: 1280, height: 720 }
watchdog: { max_backoff_secs: 30 }
startup:
  source: rtsp://cam/1
  loop: false
"#,
        )
        .unwrap();

        let core = config.to_core_config();
        assert_eq!(core.player.media_dir, PathBuf::from("/srv/media"));
        assert_eq!(core.player.extra_args, vec!["--vo=gpu".to_string()]);
        assert_eq!(core.player.mpv_binary, PathBuf::from("mpv"));
        assert_eq!(core.display, DisplayConfig::new(1280, 720).unwrap());
        assert_eq!(core.watchdog.max_backoff_secs, 30);
        assert_eq!(core.watchdog.probe_interval_secs, 5);
        assert!(core.validate().is_ok());

        let startup = config.startup.unwrap();
        assert_eq!(startup.source, "rtsp://cam/1");
        assert_eq!(startup.looped, Some(false));
        assert_eq!(startup.volume, None);
    }

    #[test]
    fn display_strings_are_parsed_and_validated() {
        assert_eq!(
            parse_display("3840x2160").unwrap(),
            DisplayConfig::new(3840, 2160).unwrap()
        );
        assert!(parse_display("1920").is_err());
        assert!(parse_display("wide x tall").is_err());
        assert!(parse_display("50x50").is_err());
    }
}
