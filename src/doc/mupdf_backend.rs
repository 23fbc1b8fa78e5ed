//! `mupdf`-backed implementation of the [`Document`] trait.
//!
//! Overlay specs come from an optional YAML sidecar next to the PDF
//! (`talk.pdf` -> `talk.pdf.media.yaml`), a list of [`OverlaySpec`]s.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, warn};
use mupdf::{Colorspace, Matrix};

use super::{Document, PageSize, RenderFault};
use crate::overlay::OverlaySpec;
use crate::render::Bitmap;

/// Sidecar suffix appended to the document path
const MEDIA_SIDECAR_SUFFIX: &str = ".media.yaml";

pub struct MupdfDocument {
    // mupdf handles are not thread-safe; all fitz calls go through this lock
    inner: Mutex<mupdf::Document>,
    page_count: usize,
    page_sizes: Vec<PageSize>,
    overlays: Vec<OverlaySpec>,
}

impl MupdfDocument {
    /// Open a PDF and extract the metadata the viewer needs up front
    pub fn open(path: &Path) -> Result<Self, RenderFault> {
        let doc = mupdf::Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| RenderFault::raster(0, format!("open {path:?}: {e}")))?;
        let page_count = doc
            .page_count()
            .map_err(|e| RenderFault::raster(0, e.to_string()))? as usize;

        let mut page_sizes = Vec::with_capacity(page_count);
        for index in 0..page_count {
            let size = doc
                .load_page(index as i32)
                .and_then(|page| page.bounds())
                .map(|bounds| PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
                .unwrap_or_else(|e| {
                    warn!("no bounds for page {index}: {e}");
                    PageSize::new(612.0, 792.0)
                });
            page_sizes.push(size);
        }

        let overlays = load_media_sidecar(path);
        info!(
            "opened {path:?}: {page_count} pages, {} media overlays",
            overlays.len()
        );

        Ok(Self {
            inner: Mutex::new(doc),
            page_count,
            page_sizes,
            overlays,
        })
    }
}

impl Document for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Option<PageSize> {
        self.page_sizes.get(page).copied()
    }

    fn render(&self, page: usize, width: u32, height: u32) -> Result<Bitmap, RenderFault> {
        if page >= self.page_count {
            return Err(RenderFault::OutOfRange {
                page,
                page_count: self.page_count,
            });
        }
        let size = self.page_sizes[page];
        // fit inside the target box, preserving aspect ratio
        let mag = if size.width > 0.0 && size.height > 0.0 {
            (width as f32 / size.width).min(height as f32 / size.height)
        } else {
            1.0
        };

        let doc = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let fitz_page = doc
            .load_page(page as i32)
            .map_err(|e| RenderFault::raster(page, e.to_string()))?;
        let transform = Matrix::new_scale(mag, mag);
        let rgb = Colorspace::device_rgb();
        let pixmap = fitz_page
            .to_pixmap(&transform, &rgb, false, false)
            .map_err(|e| RenderFault::raster(page, e.to_string()))?;

        let pixels = pixmap_to_rgb(&pixmap).map_err(|detail| RenderFault::raster(page, detail))?;
        Ok(Bitmap::new(pixmap.width(), pixmap.height(), pixels))
    }

    fn resolve_label(&self, label: &str) -> Option<usize> {
        // printed labels are 1-based
        label
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .filter(|&page| page < self.page_count)
    }

    fn label(&self, page: usize) -> Option<String> {
        (page < self.page_count).then(|| (page + 1).to_string())
    }

    fn overlay_specs(&self, page: usize) -> Vec<OverlaySpec> {
        self.overlays
            .iter()
            .filter(|spec| spec.page == page)
            .cloned()
            .collect()
    }
}

fn sidecar_path(doc_path: &Path) -> PathBuf {
    let mut name = doc_path.as_os_str().to_os_string();
    name.push(MEDIA_SIDECAR_SUFFIX);
    PathBuf::from(name)
}

fn load_media_sidecar(doc_path: &Path) -> Vec<OverlaySpec> {
    let path = sidecar_path(doc_path);
    if !path.exists() {
        return Vec::new();
    }
    match fs::read_to_string(&path) {
        Ok(content) => match serde_yaml::from_str::<Vec<OverlaySpec>>(&content) {
            Ok(specs) => {
                debug!("loaded {} overlay specs from {path:?}", specs.len());
                specs
            }
            Err(e) => {
                warn!("ignoring malformed media sidecar {path:?}: {e}");
                Vec::new()
            }
        },
        Err(e) => {
            warn!("cannot read media sidecar {path:?}: {e}");
            Vec::new()
        }
    }
}

fn pixmap_to_rgb(pixmap: &mupdf::Pixmap) -> Result<Vec<u8>, String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err("pixmap buffer size mismatch".to_string());
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row = &samples[y * stride..y * stride + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }
    Ok(out)
}
