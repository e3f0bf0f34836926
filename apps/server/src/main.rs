//! Vidzone Server - headless daemon for a single-zone video appliance.
//!
//! Boots the vidzone services around an mpv renderer, optionally starts the
//! configured content, and runs until SIGINT/SIGTERM. Control requests reach
//! the services through the `PlayerController` facade.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use vidzone_core::{bootstrap_services, BroadcastEvent, DisplayConfig, PlayParams};

use crate::config::{parse_display, ServerConfig};

/// Vidzone Server - Headless mpv video zone controller.
#[derive(Parser, Debug)]
#[command(name = "vidzone-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "VIDZONE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Data directory for persistent state (presets).
    #[arg(short = 'd', long, env = "VIDZONE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Media directory (overrides config file).
    #[arg(short = 'm', long, env = "VIDZONE_MEDIA_DIR")]
    media_dir: Option<PathBuf>,

    /// Display resolution as WIDTHxHEIGHT (overrides config file).
    #[arg(long, value_parser = parse_display)]
    display: Option<DisplayConfig>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Vidzone Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(media_dir) = args.media_dir {
        config.media_dir = media_dir;
    }
    if let Some(display) = args.display {
        config.display = display;
    }

    log::info!(
        "Configuration: mpv={}, media_dir={}, display={}",
        config.mpv_binary.display(),
        config.media_dir.display(),
        config.display
    );
    match &config.data_dir {
        Some(data_dir) => log::info!("Using data directory: {}", data_dir.display()),
        None => log::info!("No data directory configured - presets will not persist"),
    }

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Surface watchdog activity in the daemon log
    let mut events = services.controller.subscribe();
    let cancel = services.cancel_token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(BroadcastEvent::Watchdog(event)) => log::info!("Watchdog: {:?}", event),
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("Event log lagged by {} event(s)", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });

    if let Some(startup) = &config.startup {
        log::info!("Starting configured content: {}", startup.source);
        let params = PlayParams {
            source: startup.source.clone(),
            looped: startup.looped,
            volume: startup.volume,
            geometry: None,
        };
        if let Err(e) = services.controller.play(params).await {
            log::error!("Startup playback failed: {} ({})", e, e.code());
        }
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown
    services.shutdown().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
