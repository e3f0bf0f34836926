//! Application services layer.
//!
//! The supervisor owns the renderer, the preset store owns durable presets,
//! the watchdog keeps live streams running, and the controller is the facade
//! an outer API layer calls into.

pub mod controller;
pub mod preset_store;
pub mod supervisor;
pub mod watchdog;

pub use controller::{PlayParams, PlayerController};
pub use preset_store::{Preset, PresetError, PresetList, PresetStore};
pub use supervisor::{PlaybackStatus, PlayerState, PlayerSupervisor, Probe, SupervisorConfig};
pub use watchdog::{StreamWatchdog, WatchdogPhase};
