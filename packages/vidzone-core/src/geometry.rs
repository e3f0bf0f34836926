//! Zone geometry and display bounds.
//!
//! All coordinates are absolute display pixels with the origin at the top-left
//! corner of the configured display. Requests are never relative, so applying
//! the same geometry twice yields the same window.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::{
    DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_WIDTH, MAX_DISPLAY_DIM, MIN_DIM,
};

/// Reasons a geometry or display resolution is rejected outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Zone width or height below the minimum.
    #[error("zone must be at least {min}x{min} pixels, got {width}x{height}")]
    TooSmall { width: i32, height: i32, min: i32 },

    /// Zone position is negative (presets only; live requests are clamped).
    #[error("zone position must be non-negative, got ({x}, {y})")]
    NegativePosition { x: i32, y: i32 },

    /// Display resolution outside the supported range.
    #[error("display resolution {width}x{height} outside {min}..={max}")]
    DisplayOutOfRange {
        width: i32,
        height: i32,
        min: i32,
        max: i32,
    },
}

/// On-screen rectangle occupied by the video zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Geometry covering the entire display.
    #[must_use]
    pub const fn full(display: DisplayConfig) -> Self {
        Self::new(0, 0, display.width, display.height)
    }

    /// Checks the display-independent constraints: minimum size and a
    /// non-negative origin.
    ///
    /// Used for presets, which are stored verbatim and only fitted to the
    /// display when applied.
    pub fn validate(&self) -> Result<(), GeometryError> {
        self.check_size()?;
        if self.x < 0 || self.y < 0 {
            return Err(GeometryError::NegativePosition {
                x: self.x,
                y: self.y,
            });
        }
        Ok(())
    }

    /// Fits the geometry inside `display`.
    ///
    /// Undersized zones are rejected. Oversized zones are shrunk to the
    /// display, then the origin is clamped so the zone ends at or before the
    /// right and bottom edges. A geometry that already fits is returned
    /// unchanged.
    pub fn fit_to(&self, display: DisplayConfig) -> Result<Geometry, GeometryError> {
        self.check_size()?;
        let width = self.width.min(display.width);
        let height = self.height.min(display.height);
        let fitted = Geometry {
            x: self.x.clamp(0, display.width - width),
            y: self.y.clamp(0, display.height - height),
            width,
            height,
        };
        debug_assert!(fitted.fits_within(display));
        Ok(fitted)
    }

    /// Returns true if the zone lies entirely within `display`.
    #[must_use]
    pub(crate) fn fits_within(&self, display: DisplayConfig) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width >= MIN_DIM
            && self.height >= MIN_DIM
            && self.x + self.width <= display.width
            && self.y + self.height <= display.height
    }

    /// Formats the geometry as an X11-style `WxH+X+Y` string.
    #[must_use]
    pub fn to_window_spec(&self) -> String {
        format!("{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }

    fn check_size(&self) -> Result<(), GeometryError> {
        if self.width < MIN_DIM || self.height < MIN_DIM {
            return Err(GeometryError::TooSmall {
                width: self.width,
                height: self.height,
                min: MIN_DIM,
            });
        }
        Ok(())
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::full(DisplayConfig::default())
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_window_spec())
    }
}

/// Resolution of the physical display the zone is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: i32,
    pub height: i32,
}

impl DisplayConfig {
    /// Creates a validated display configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DisplayOutOfRange`] if either axis is smaller
    /// than one minimum-sized zone or larger than [`MAX_DISPLAY_DIM`].
    pub fn new(width: i32, height: i32) -> Result<Self, GeometryError> {
        let in_range = |v: i32| (MIN_DIM..=MAX_DISPLAY_DIM).contains(&v);
        if !in_range(width) || !in_range(height) {
            return Err(GeometryError::DisplayOutOfRange {
                width,
                height,
                min: MIN_DIM,
                max: MAX_DISPLAY_DIM,
            });
        }
        Ok(Self { width, height })
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_DISPLAY_WIDTH,
            height: DEFAULT_DISPLAY_HEIGHT,
        }
    }
}

impl fmt::Display for DisplayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
