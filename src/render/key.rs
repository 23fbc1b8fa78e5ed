//! Cache keys and bitmap data for rendered slides

use serde::{Deserialize, Serialize};

/// Intended consumer of a rendered bitmap
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Audience window, content only
    Content,
    /// Presenter window, main view
    Presenter,
    /// Presenter window, next-slide thumbnail
    Preview,
    /// Presenter window, annotated notes
    Notes,
}

impl Purpose {
    pub const ALL: [Purpose; 4] = [
        Purpose::Content,
        Purpose::Presenter,
        Purpose::Preview,
        Purpose::Notes,
    ];

    /// Purposes that only exist on the presenter window and never gate the
    /// audience-visible frame
    #[must_use]
    pub fn presenter_only(self) -> bool {
        matches!(self, Purpose::Preview | Purpose::Notes)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Content => "content",
            Purpose::Presenter => "presenter",
            Purpose::Preview => "preview",
            Purpose::Notes => "notes",
        }
    }
}

/// Cache key for rendered slides.
///
/// Width and height are quantized at construction so that sub-pixel window
/// resizes map to the same key instead of thrashing the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderKey {
    /// Page number (0-indexed)
    pub page: usize,
    /// Consumer of the bitmap
    pub purpose: Purpose,
    /// Quantized target width in pixels
    pub width: u32,
    /// Quantized target height in pixels
    pub height: u32,
}

impl RenderKey {
    /// Create a key, rounding the target size up to the next multiple of
    /// `quantize_px` (never below one step). Rounding up keeps sizes a few
    /// pixels apart on the same key; round-to-nearest would split them
    /// across a half-step boundary.
    #[must_use]
    pub fn quantized(page: usize, purpose: Purpose, width: u32, height: u32, quantize_px: u32) -> Self {
        let q = quantize_px.max(1);
        let round = |v: u32| (((v + q - 1) / q) * q).max(q);
        Self {
            page,
            purpose,
            width: round(width),
            height: round(height),
        }
    }
}

impl std::fmt::Display for RenderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "p{}/{}@{}x{}",
            self.page,
            self.purpose.as_str(),
            self.width,
            self.height
        )
    }
}

/// Rendered slide image (RGB, 3 bytes per pixel).
///
/// Produced once by a render worker, then shared read-only via `Arc`.
#[derive(Clone)]
pub struct Bitmap {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Raw RGB pixel data
    pub pixels: Vec<u8>,
}

impl Bitmap {
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Solid-color bitmap, used by tests and placeholder rendering
    #[must_use]
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Heap footprint used for the cache byte bound
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_collapses_subpixel_resizes() {
        let a = RenderKey::quantized(3, Purpose::Content, 1917, 1078, 16);
        let b = RenderKey::quantized(3, Purpose::Content, 1920, 1080, 16);
        assert_eq!(a, b);
        // 1078 and 1080 sit on opposite sides of the 1080 half-step;
        // rounding up maps both to 1088
        assert_eq!(a.height, 1088);
    }

    #[test]
    fn quantization_never_rounds_to_zero() {
        let key = RenderKey::quantized(0, Purpose::Preview, 3, 2, 16);
        assert_eq!(key.width, 16);
        assert_eq!(key.height, 16);
    }

    #[test]
    fn distinct_purposes_are_distinct_keys() {
        let a = RenderKey::quantized(0, Purpose::Content, 800, 600, 16);
        let b = RenderKey::quantized(0, Purpose::Presenter, 800, 600, 16);
        assert_ne!(a, b);
    }

    #[test]
    fn unit_quantization_is_identity() {
        let key = RenderKey::quantized(1, Purpose::Notes, 801, 601, 1);
        assert_eq!((key.width, key.height), (801, 601));
    }
}
