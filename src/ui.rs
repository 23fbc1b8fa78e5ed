//! UI-thread plumbing.
//!
//! The windowing toolkit is an external collaborator; this module owns only
//! the pieces the core needs from it: a post-to-UI-thread queue, the window
//! roles, and a thin presenter that keeps each display surface fed from the
//! bitmap cache.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::render::{Bitmap, BitmapCache, CacheNotice, Purpose, RenderKey};

/// Which window a widget or overlay is bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowRole {
    /// The full-screen slide window the audience sees
    Audience,
    /// The speaker's window with preview, notes and timer
    Presenter,
}

type UiCallback = Box<dyn FnOnce() + Send>;

/// Thread-safe queue of callbacks to run on the UI thread.
///
/// Owned by the UI thread; worker threads and media backends hold
/// [`UiHandle`]s and post closures, which run on the next `run_pending`.
pub struct UiQueue {
    tx: flume::Sender<UiCallback>,
    rx: flume::Receiver<UiCallback>,
}

impl UiQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    #[must_use]
    pub fn handle(&self) -> UiHandle {
        UiHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every callback posted so far. Never blocks.
    pub fn run_pending(&self) {
        while let Ok(callback) = self.rx.try_recv() {
            callback();
        }
    }
}

impl Default for UiQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct UiHandle {
    tx: flume::Sender<UiCallback>,
}

impl UiHandle {
    /// Post a closure to run on the UI thread. Dropped silently if the
    /// queue is gone (shutdown).
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(callback));
    }
}

/// One drawable area fed by the presenter
pub trait Surface {
    fn present(&mut self, page: usize, bitmap: &Arc<Bitmap>);
    /// Shown while the page's bitmap is missing (still rendering, or the
    /// render failed)
    fn placeholder(&mut self, page: usize);
}

struct SurfaceSlot {
    surface: Box<dyn Surface>,
    wanted: Option<RenderKey>,
}

/// Keeps each attached surface showing the bitmap for its wanted key,
/// swapping the placeholder for the real bitmap as cache notices arrive.
pub struct Presenter {
    cache: Arc<BitmapCache>,
    notices: flume::Receiver<CacheNotice>,
    surfaces: HashMap<Purpose, SurfaceSlot>,
}

impl Presenter {
    #[must_use]
    pub fn new(cache: Arc<BitmapCache>) -> Self {
        let notices = cache.subscribe();
        Self {
            cache,
            notices,
            surfaces: HashMap::new(),
        }
    }

    pub fn attach(&mut self, purpose: Purpose, surface: Box<dyn Surface>) {
        self.surfaces.insert(
            purpose,
            SurfaceSlot {
                surface,
                wanted: None,
            },
        );
    }

    /// Point the surface for the key's purpose at that key. Presents
    /// immediately on a cache hit, otherwise shows the placeholder until
    /// the render lands.
    pub fn show(&mut self, key: RenderKey) {
        let Some(slot) = self.surfaces.get_mut(&key.purpose) else {
            return;
        };
        slot.wanted = Some(key);
        match self.cache.get(&key) {
            Some(bitmap) => slot.surface.present(key.page, &bitmap),
            None => {
                debug!("miss on {key}, placeholder up");
                slot.surface.placeholder(key.page);
            }
        }
    }

    /// Drain cache notices, refreshing any surface whose wanted key just
    /// became available. UI thread only.
    pub fn pump(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            let Some(slot) = self.surfaces.get_mut(&notice.key.purpose) else {
                continue;
            };
            if slot.wanted != Some(notice.key) {
                continue;
            }
            if let Some(bitmap) = self.cache.get(&notice.key) {
                slot.surface.present(notice.key.page, &bitmap);
            }
        }
    }
}
