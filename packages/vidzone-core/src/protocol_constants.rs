//! Fixed constants for the renderer protocol and zone geometry.
//!
//! These values are shared between the renderer launch contract, the IPC
//! transport and geometry validation. Tunables that operators may reasonably
//! change live in [`crate::state::Config`] instead.

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Smallest accepted zone width or height in display pixels.
pub const MIN_DIM: i32 = 100;

/// Largest accepted display width or height in pixels.
///
/// Covers 8K panels and common LED wall controllers with margin.
pub const MAX_DISPLAY_DIM: i32 = 16384;

/// Display width assumed until a resolution is configured.
pub const DEFAULT_DISPLAY_WIDTH: i32 = 1920;

/// Display height assumed until a resolution is configured.
pub const DEFAULT_DISPLAY_HEIGHT: i32 = 1080;

// ─────────────────────────────────────────────────────────────────────────────
// Playback Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Volume used when `play` does not specify one.
pub const DEFAULT_VOLUME: u8 = 50;

/// Loop setting used when `play` does not specify one.
pub const DEFAULT_LOOP: bool = true;

// ─────────────────────────────────────────────────────────────────────────────
// mpv JSON IPC
// ─────────────────────────────────────────────────────────────────────────────

/// Value of the `error` field in a successful IPC reply.
pub const IPC_SUCCESS: &str = "success";

/// Renderer properties observed after every launch.
///
/// The observation id doubles as a stable tag in `property-change` events.
pub const OBSERVED_PROPERTIES: [(u64, &str); 3] = [(1, "time-pos"), (2, "duration"), (3, "pause")];

/// Name of the runtime property used for live window move/resize.
pub const GEOMETRY_PROPERTY: &str = "geometry";

// ─────────────────────────────────────────────────────────────────────────────
// Media Library
// ─────────────────────────────────────────────────────────────────────────────

/// File extensions recognised as playable media (lowercase, no dot).
pub const MEDIA_EXTENSIONS: [&str; 8] = ["mp4", "avi", "mkv", "mov", "webm", "flv", "wmv", "m4v"];

/// URL schemes treated as live network streams for watchdog supervision.
pub const LIVE_STREAM_SCHEMES: [&str; 5] = ["rtsp", "rtsps", "rtmp", "srt", "udp"];

// ─────────────────────────────────────────────────────────────────────────────
// Presets
// ─────────────────────────────────────────────────────────────────────────────

/// File name of the durable preset document inside the data directory.
pub const PRESETS_FILE: &str = "presets.json";

/// Maximum preset name length in characters.
pub const MAX_PRESET_NAME_LEN: usize = 64;
