//! Vidzone Core - control library for a single-zone video appliance.
//!
//! The crate supervises one mpv renderer on a headless display: it starts and
//! stops playback, keeps the on-screen zone in sync with requested geometry,
//! stores named geometry presets, and restarts live streams that stall. It is
//! used by the headless server and is meant to sit behind an HTTP layer.
//!
//! # Architecture
//!
//! - [`player`]: mpv subprocess and its JSON IPC transport behind the
//!   [`MediaBackend`](player::MediaBackend) trait
//! - [`services`]: supervisor actor, preset store, stream watchdog and the
//!   [`PlayerController`](services::PlayerController) facade
//! - [`events`]: domain events and their broadcast bridge
//! - [`geometry`]: zone geometry and display fitting rules
//! - [`media`]: media directory resolution and listing
//! - [`state`]: configuration
//! - [`error`]: centralized error types
//! - [`bootstrap`]: composition root

#![allow(missing_docs)]
#![warn(clippy::all)]

#[cfg(not(unix))]
compile_error!("vidzone-core drives mpv over a Unix domain socket and only builds on Unix");

pub mod bootstrap;
pub mod error;
pub mod events;
pub mod geometry;
pub mod media;
pub mod player;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_services, bootstrap_with_backend, BootstrappedServices};
pub use error::{ErrorBody, ErrorCode, VidzoneError, VidzoneResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, PlayerEvent, PresetEvent, WatchdogEvent,
};
pub use geometry::{DisplayConfig, Geometry, GeometryError};
pub use media::{MediaFile, MediaLibrary};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{PlayParams, PlaybackStatus, PlayerController, PlayerState};
pub use state::{Config, PlayerConfig, WatchdogConfig};
pub use utils::now_millis;
