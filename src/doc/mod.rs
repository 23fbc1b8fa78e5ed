//! Document collaborator: the page source the viewer renders from.
//!
//! PDF (or any other) parsing lives behind the [`Document`] trait; the core
//! only ever sees page counts, page geometry, rendered bitmaps, link labels
//! and overlay specs. A thin `mupdf`-backed adapter is provided behind the
//! `pdf` feature.

#[cfg(feature = "pdf")]
pub mod mupdf_backend;

use std::sync::Arc;

use crate::overlay::OverlaySpec;
use crate::render::Bitmap;

/// Page geometry in document units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Width over height; 1.0 for degenerate pages
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 && self.width > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// Errors from the rasterization side of the document collaborator.
///
/// A failed render is logged and treated as a permanent cache miss for that
/// key; it is never fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum RenderFault {
    #[error("page {page} out of range (document has {page_count} pages)")]
    OutOfRange { page: usize, page_count: usize },

    #[error("page {page} could not be rasterized: {detail}")]
    Raster { page: usize, detail: String },
}

impl RenderFault {
    pub fn raster(page: usize, detail: impl Into<String>) -> Self {
        Self::Raster {
            page,
            detail: detail.into(),
        }
    }
}

/// The document model the viewer navigates and renders.
///
/// Implementations must be callable from render worker threads.
pub trait Document: Send + Sync {
    /// Total number of pages
    fn page_count(&self) -> usize;

    /// Geometry of a page, `None` when out of range
    fn page_size(&self, page: usize) -> Option<PageSize>;

    /// Rasterize a page into a bitmap of roughly the given size.
    ///
    /// Blocking and potentially slow; only ever called off the UI thread.
    fn render(&self, page: usize, width: u32, height: u32) -> Result<Bitmap, RenderFault>;

    /// Resolve a named destination / label to a page index
    fn resolve_label(&self, label: &str) -> Option<usize>;

    /// Printed label of a page ("iv", "7", ...), if the document defines one
    fn label(&self, _page: usize) -> Option<String> {
        None
    }

    /// Media annotations anchored to a page. Extracted on demand; callers
    /// cache the result per page index.
    fn overlay_specs(&self, page: usize) -> Vec<OverlaySpec>;
}

/// Shared handle passed to the scheduler workers and the navigation layer
pub type SharedDocument = Arc<dyn Document>;
