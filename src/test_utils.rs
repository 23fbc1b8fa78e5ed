//! Shared fixtures for unit and integration tests: an in-memory document
//! and a recording media backend.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::doc::{Document, PageSize, RenderFault};
use crate::overlay::{
    MediaBackend, MediaFault, OverlaySpec, PixelRect, PlayerEvent, PlayerHandle,
};
use crate::render::Bitmap;
use crate::ui::WindowRole;

/// In-memory document with configurable failures, render latency, labels
/// and overlay specs.
pub struct FixtureDocument {
    pages: usize,
    render_calls: AtomicUsize,
    render_delay: Mutex<Duration>,
    failing_pages: Mutex<HashSet<usize>>,
    labels: Mutex<HashMap<String, usize>>,
    overlays: Mutex<Vec<OverlaySpec>>,
}

impl FixtureDocument {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            render_calls: AtomicUsize::new(0),
            render_delay: Mutex::new(Duration::ZERO),
            failing_pages: Mutex::new(HashSet::new()),
            labels: Mutex::new(HashMap::new()),
            overlays: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent render block for the given duration
    pub fn set_render_delay(&self, delay: Duration) {
        *self.render_delay.lock().unwrap() = delay;
    }

    /// Make renders of the given page fail from now on
    pub fn fail_page(&self, page: usize) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    pub fn add_label(&self, name: impl Into<String>, page: usize) {
        self.labels.lock().unwrap().insert(name.into(), page);
    }

    pub fn add_overlay(&self, spec: OverlaySpec) {
        self.overlays.lock().unwrap().push(spec);
    }

    /// Number of render calls that actually ran
    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

impl Document for FixtureDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_size(&self, page: usize) -> Option<PageSize> {
        (page < self.pages).then(|| PageSize::new(612.0, 459.0))
    }

    fn render(&self, page: usize, width: u32, height: u32) -> Result<Bitmap, RenderFault> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.render_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if page >= self.pages {
            return Err(RenderFault::OutOfRange {
                page,
                page_count: self.pages,
            });
        }
        if self.failing_pages.lock().unwrap().contains(&page) {
            return Err(RenderFault::raster(page, "synthetic failure"));
        }
        let shade = (page % 256) as u8;
        Ok(Bitmap::solid(width, height, [shade, shade, shade]))
    }

    fn resolve_label(&self, label: &str) -> Option<usize> {
        if let Some(&page) = self.labels.lock().unwrap().get(label) {
            return Some(page);
        }
        // bare page numbers resolve too, 1-based like printed labels
        label
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .filter(|&page| page < self.pages)
    }

    fn overlay_specs(&self, page: usize) -> Vec<OverlaySpec> {
        self.overlays
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.page == page)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct StubShared {
    opens: Mutex<Vec<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
    failing_playback: Mutex<HashSet<String>>,
    transport: Mutex<Vec<String>>,
}

/// Media backend that records every open and transport call.
///
/// Clones share state, so tests keep one copy and hand the other to the
/// overlay manager.
#[derive(Clone, Default)]
pub struct StubMediaBackend {
    shared: Arc<StubShared>,
}

impl StubMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opens of the given source fail
    pub fn fail_source(&self, source: impl Into<PathBuf>) {
        self.shared.failing.lock().unwrap().insert(source.into());
    }

    /// Make `play()` on players for the given source fail
    pub fn fail_playback(&self, source: impl Into<String>) {
        self.shared
            .failing_playback
            .lock()
            .unwrap()
            .insert(source.into());
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.lock().unwrap().len()
    }

    pub fn transport_log(&self) -> Vec<String> {
        self.shared.transport.lock().unwrap().clone()
    }
}

struct StubPlayer {
    source: String,
    shared: Arc<StubShared>,
}

impl StubPlayer {
    fn log(&self, entry: String) {
        self.shared.transport.lock().unwrap().push(entry);
    }
}

impl PlayerHandle for StubPlayer {
    fn play(&mut self) -> Result<(), MediaFault> {
        if self
            .shared
            .failing_playback
            .lock()
            .unwrap()
            .contains(&self.source)
        {
            return Err(MediaFault::playback("synthetic playback failure"));
        }
        self.log(format!("play {}", self.source));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), MediaFault> {
        self.log(format!("pause {}", self.source));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MediaFault> {
        self.log(format!("stop {}", self.source));
        Ok(())
    }

    fn set_region(&mut self, rect: PixelRect) -> Result<(), MediaFault> {
        self.log(format!(
            "set_region {} {}x{}+{}+{}",
            self.source, rect.width, rect.height, rect.x, rect.y
        ));
        Ok(())
    }
}

impl MediaBackend for StubMediaBackend {
    fn open(
        &self,
        spec: &OverlaySpec,
        _window: WindowRole,
        _events: flume::Sender<PlayerEvent>,
    ) -> Result<Box<dyn PlayerHandle>, MediaFault> {
        if self.shared.failing.lock().unwrap().contains(&spec.source) {
            return Err(MediaFault::open(
                spec.source.display().to_string(),
                "synthetic open failure",
            ));
        }
        self.shared.opens.lock().unwrap().push(spec.source.clone());
        Ok(Box::new(StubPlayer {
            source: spec.source.display().to_string(),
            shared: Arc::clone(&self.shared),
        }))
    }
}
