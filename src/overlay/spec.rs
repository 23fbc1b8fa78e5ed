//! Overlay placement specs extracted from document annotations

use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

/// Rectangular page region in normalized coordinates (0..1, origin top-left)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A region with negative or degenerate margins is not shown; documents
    /// in the wild do carry such annotations.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let vals = [self.x, self.y, self.width, self.height];
        vals.iter().all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON
    }

    /// Map to pixel coordinates within a window of the given size
    #[must_use]
    pub fn to_pixels(&self, window_width: u32, window_height: u32) -> PixelRect {
        let w = window_width as f32;
        let h = window_height as f32;
        PixelRect {
            x: (self.x * w).round() as u32,
            y: (self.y * h).round() as u32,
            width: (self.width * w).round().max(1.0) as u32,
            height: (self.height * h).round().max(1.0) as u32,
        }
    }

    fn millionths(&self) -> (u32, u32, u32, u32) {
        let m = |v: f32| (v * 1_000_000.0) as u32;
        (m(self.x), m(self.y), m(self.width), m(self.height))
    }
}

/// Region mapped to window pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Media annotation on one page, immutable after extraction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverlaySpec {
    /// Page number (0-indexed) the overlay is anchored to
    pub page: usize,
    /// Placement within the page, normalized 0..1
    pub region: Region,
    /// Path to the media file
    pub source: PathBuf,
    /// Start playback as soon as the page is entered
    #[serde(default)]
    pub autoplay: bool,
    /// Restart playback on natural end
    #[serde(default)]
    pub loop_playback: bool,
    /// Keep the instance alive across page transitions (background audio)
    #[serde(default)]
    pub persist: bool,
    /// Show the player toolbar over the region
    #[serde(default = "default_show_controls")]
    pub show_controls: bool,
}

fn default_show_controls() -> bool {
    true
}

impl OverlaySpec {
    /// Identity of the overlay: one live instance per (page, region) pair.
    ///
    /// Region coordinates are folded to millionths (stable against float
    /// noise) the same way scale factors are folded into render cache keys.
    #[must_use]
    pub fn key(&self) -> OverlayKey {
        OverlayKey {
            page: self.page,
            region_millionths: self.region.millionths(),
        }
    }

    /// Validate the spec for display, logging the reason when rejected
    #[must_use]
    pub fn displayable(&self) -> bool {
        if !self.region.is_valid() {
            warn!(
                "not showing media {:?} with invalid region {:?}",
                self.source, self.region
            );
            return false;
        }
        true
    }
}

/// Hashable identity of an overlay instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OverlayKey {
    pub page: usize,
    region_millionths: (u32, u32, u32, u32),
}
