//! Per-page media overlay lifecycle.
//!
//! The manager is owned by the UI thread. Backends report playback changes
//! asynchronously over a channel; [`OverlayManager::handle_events`] drains
//! that channel on the UI thread before any instance state is touched.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};

use super::player::{MediaBackend, PlayerEvent, PlayerEventKind, PlayerHandle, PlaybackState};
use super::spec::{OverlayKey, OverlaySpec, Region};
use crate::doc::SharedDocument;
use crate::ui::WindowRole;

struct OverlayInstance {
    spec: OverlaySpec,
    window: WindowRole,
    // None once the instance has failed
    handle: Option<Box<dyn PlayerHandle>>,
    state: PlaybackState,
    duration_secs: Option<f64>,
}

/// Lifecycle manager for media regions on slides.
///
/// One instance per distinct (page, region) pair is alive at a time.
/// Specs are resolved from the document once per page and cached.
pub struct OverlayManager {
    doc: SharedDocument,
    backend: Box<dyn MediaBackend>,
    specs: HashMap<usize, Arc<Vec<OverlaySpec>>>,
    instances: HashMap<OverlayKey, OverlayInstance>,
    geometry: HashMap<WindowRole, (u32, u32)>,
    events_tx: flume::Sender<PlayerEvent>,
    events_rx: flume::Receiver<PlayerEvent>,
    // instances paused by pause_all, to be resumed together
    resumable: Vec<OverlayKey>,
    // global configuration switch; per-spec autoplay flags only apply
    // while this is on
    autoplay_enabled: bool,
}

impl OverlayManager {
    pub fn new(doc: SharedDocument, backend: Box<dyn MediaBackend>) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            doc,
            backend,
            specs: HashMap::new(),
            instances: HashMap::new(),
            geometry: HashMap::new(),
            events_tx,
            events_rx,
            resumable: Vec::new(),
            autoplay_enabled: true,
        }
    }

    /// Disable or re-enable autoplay globally; specs still start on the
    /// user's explicit toggle
    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay_enabled = enabled;
    }

    /// Displayable overlay specs for a page, resolved once and cached
    pub fn specs_for(&mut self, page: usize) -> Arc<Vec<OverlaySpec>> {
        if let Some(cached) = self.specs.get(&page) {
            return Arc::clone(cached);
        }
        let specs: Vec<OverlaySpec> = self
            .doc
            .overlay_specs(page)
            .into_iter()
            .filter(OverlaySpec::displayable)
            .collect();
        let specs = Arc::new(specs);
        self.specs.insert(page, Arc::clone(&specs));
        specs
    }

    /// Create an instance per spec on the page, binding each to its region
    /// on the audience window. Autoplay specs start immediately. Specs whose
    /// (page, region) already has a live instance are left alone.
    pub fn on_page_enter(&mut self, page: usize) {
        let specs = self.specs_for(page);
        for spec in specs.iter() {
            let key = spec.key();
            if self.instances.contains_key(&key) {
                continue;
            }
            self.spawn_instance(key, spec.clone(), WindowRole::Audience);
        }
    }

    /// Stop and destroy instances bound to the page, except those whose
    /// spec asks to persist across pages
    pub fn on_page_exit(&mut self, page: usize) {
        let leaving: Vec<OverlayKey> = self
            .instances
            .iter()
            .filter(|(key, inst)| key.page == page && !inst.spec.persist)
            .map(|(key, _)| *key)
            .collect();
        for key in leaving {
            if let Some(mut inst) = self.instances.remove(&key) {
                if let Some(handle) = inst.handle.as_mut() {
                    if let Err(fault) = handle.stop() {
                        warn!("stopping overlay {key:?}: {fault}");
                    }
                }
                debug!("destroyed overlay instance on page {page}");
            }
        }
        self.resumable.retain(|key| self.instances.contains_key(key));
    }

    /// Record a window's pixel size and reposition bound instances without
    /// restarting playback
    pub fn resize(&mut self, window: WindowRole, width: u32, height: u32) {
        self.geometry.insert(window, (width, height));
        for inst in self.instances.values_mut() {
            if inst.window != window {
                continue;
            }
            if let Some(handle) = inst.handle.as_mut() {
                let rect = inst.spec.region.to_pixels(width, height);
                if let Err(fault) = handle.set_region(rect) {
                    warn!("repositioning overlay: {fault}");
                }
            }
        }
    }

    /// Pause every playing instance, remembering the set so `resume_all`
    /// restarts exactly those
    pub fn pause_all(&mut self) {
        self.resumable.clear();
        for (key, inst) in &mut self.instances {
            if inst.state != PlaybackState::Playing {
                continue;
            }
            if let Some(handle) = inst.handle.as_mut() {
                match handle.pause() {
                    Ok(()) => {
                        inst.state = PlaybackState::Paused;
                        self.resumable.push(*key);
                    }
                    Err(fault) => warn!("pausing overlay {key:?}: {fault}"),
                }
            }
        }
    }

    /// Resume the instances paused by the last `pause_all`
    pub fn resume_all(&mut self) {
        for key in std::mem::take(&mut self.resumable) {
            if let Some(inst) = self.instances.get_mut(&key) {
                if let Some(handle) = inst.handle.as_mut() {
                    match handle.play() {
                        Ok(()) => inst.state = PlaybackState::Playing,
                        Err(fault) => warn!("resuming overlay {key:?}: {fault}"),
                    }
                }
            }
        }
    }

    /// User play/pause toggle on one instance
    pub fn toggle(&mut self, key: OverlayKey) {
        let Some(inst) = self.instances.get_mut(&key) else {
            return;
        };
        if inst.state.is_terminal() {
            return;
        }
        let Some(handle) = inst.handle.as_mut() else {
            return;
        };
        let outcome = match inst.state {
            PlaybackState::Playing => handle.pause().map(|()| PlaybackState::Paused),
            _ => handle.play().map(|()| PlaybackState::Playing),
        };
        match outcome {
            Ok(next) => inst.state = next,
            Err(fault) => warn!("toggling overlay {key:?}: {fault}"),
        }
    }

    /// Drain pending backend events and apply them to instance state.
    /// Must be called from the UI thread.
    pub fn handle_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            let Some(inst) = self.instances.get_mut(&event.overlay) else {
                // instance already destroyed, late event
                continue;
            };
            match event.kind {
                PlayerEventKind::Finished => {
                    if inst.spec.loop_playback {
                        if let Some(handle) = inst.handle.as_mut() {
                            match handle.play() {
                                Ok(()) => inst.state = PlaybackState::Playing,
                                Err(fault) => {
                                    warn!("looping overlay {:?}: {fault}", event.overlay);
                                    inst.state = PlaybackState::Failed;
                                    inst.handle = None;
                                }
                            }
                        }
                    } else {
                        inst.state = PlaybackState::Finished;
                    }
                }
                PlayerEventKind::DurationKnown(secs) => {
                    inst.duration_secs = Some(secs);
                }
                PlayerEventKind::Error(detail) => {
                    warn!("overlay {:?} failed mid-playback: {detail}", event.overlay);
                    inst.state = PlaybackState::Failed;
                    inst.handle = None;
                }
            }
        }
    }

    /// Drop the cached per-page specs so the next page entry re-extracts
    /// them from the document. Used on document reload.
    pub fn forget_specs(&mut self) {
        self.specs.clear();
    }

    /// Regions on a page whose instance is in the Failed state, for
    /// placeholder drawing
    #[must_use]
    pub fn failed_regions(&self, page: usize) -> Vec<Region> {
        self.instances
            .iter()
            .filter(|(key, inst)| key.page == page && inst.state == PlaybackState::Failed)
            .map(|(_, inst)| inst.spec.region)
            .collect()
    }

    /// Sender half of the backend event channel, handed to backends (and
    /// tests) that need to report state changes
    #[must_use]
    pub fn events_sender(&self) -> flume::Sender<PlayerEvent> {
        self.events_tx.clone()
    }

    #[must_use]
    pub fn instance_count(&self, page: usize) -> usize {
        self.instances.keys().filter(|key| key.page == page).count()
    }

    #[must_use]
    pub fn total_instances(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn state(&self, key: OverlayKey) -> Option<PlaybackState> {
        self.instances.get(&key).map(|inst| inst.state)
    }

    #[must_use]
    pub fn duration_secs(&self, key: OverlayKey) -> Option<f64> {
        self.instances.get(&key).and_then(|inst| inst.duration_secs)
    }

    fn spawn_instance(&mut self, key: OverlayKey, spec: OverlaySpec, window: WindowRole) {
        match self.backend.open(&spec, window, self.events_tx.clone()) {
            Ok(mut handle) => {
                if let Some(&(width, height)) = self.geometry.get(&window) {
                    let rect = spec.region.to_pixels(width, height);
                    if let Err(fault) = handle.set_region(rect) {
                        warn!("binding overlay region: {fault}");
                    }
                }
                let (state, handle) = if spec.autoplay && self.autoplay_enabled {
                    match handle.play() {
                        Ok(()) => (PlaybackState::Playing, Some(handle)),
                        Err(fault) => {
                            warn!("autoplay on page {}: {fault}", spec.page);
                            (PlaybackState::Failed, None)
                        }
                    }
                } else {
                    (PlaybackState::Stopped, Some(handle))
                };
                debug!("overlay instance on page {} -> {state:?}", spec.page);
                self.instances.insert(
                    key,
                    OverlayInstance {
                        spec,
                        window,
                        handle,
                        state,
                        duration_secs: None,
                    },
                );
            }
            Err(fault) => {
                warn!("opening overlay {}: {fault}", spec.source.display());
                self.instances.insert(
                    key,
                    OverlayInstance {
                        spec,
                        window,
                        handle: None,
                        state: PlaybackState::Failed,
                        duration_secs: None,
                    },
                );
            }
        }
    }
}
