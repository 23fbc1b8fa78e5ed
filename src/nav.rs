//! Navigation state management.
//!
//! `NavState` is a pure state machine: commands mutate it and return the
//! effects to run, which keeps the transition rules unit-testable without
//! threads or windows. `NavController` owns the state together with the
//! cache, the scheduler and the overlay manager, and executes the effects.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};

use crate::doc::SharedDocument;
use crate::overlay::OverlayManager;
use crate::render::{
    BitmapCache, PrerenderScheduler, PrerenderTask, Priority, Purpose, RenderKey,
};

/// Current navigation state for an open presentation
#[derive(Clone, Debug)]
pub struct NavState {
    /// Current page (0-indexed)
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,

    /// How many pages ahead and behind to prerender
    pub lookahead: usize,

    /// Pixel quantum for render key geometry
    pub quantize_px: u32,

    /// Target pixel size per display purpose; purposes without a known
    /// size are not prerendered
    pub geometry: HashMap<Purpose, (u32, u32)>,

    /// Screen blanked, media paused
    pub blanked: bool,
}

impl NavState {
    #[must_use]
    pub fn new(page_count: usize, lookahead: usize, quantize_px: u32) -> Self {
        Self {
            current_page: 0,
            page_count,
            lookahead,
            quantize_px,
            geometry: HashMap::new(),
            blanked: false,
        }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::GoTo(page) => {
                let clamped = page.min(self.page_count.saturating_sub(1));
                if self.current_page == clamped || self.page_count == 0 {
                    return vec![];
                }
                let previous = self.current_page;
                self.current_page = clamped;
                vec![
                    Effect::PageExit(previous),
                    Effect::PageEnter(clamped),
                    Effect::RefreshPrerenders,
                ]
            }

            Command::Next => {
                if self.current_page + 1 >= self.page_count {
                    // last page, not an error
                    return vec![];
                }
                self.apply(Command::GoTo(self.current_page + 1))
            }

            Command::Prev => {
                if self.current_page == 0 {
                    return vec![];
                }
                self.apply(Command::GoTo(self.current_page - 1))
            }

            Command::SetGeometry {
                purpose,
                width,
                height,
            } => {
                if self.geometry.get(&purpose) == Some(&(width, height)) {
                    return vec![];
                }
                self.geometry.insert(purpose, (width, height));
                vec![Effect::InvalidateCache, Effect::RefreshPrerenders]
            }

            Command::SetBlanked(blanked) => {
                if self.blanked == blanked {
                    return vec![];
                }
                self.blanked = blanked;
                if blanked {
                    vec![Effect::PauseMedia]
                } else {
                    vec![Effect::ResumeMedia]
                }
            }

            Command::Reload => {
                vec![
                    Effect::InvalidateCache,
                    Effect::ReloadDocument,
                    Effect::RefreshPrerenders,
                ]
            }

            Command::SetPageCount(count) => {
                self.page_count = count;
                if self.current_page >= count && count > 0 {
                    self.current_page = count - 1;
                }
                vec![]
            }
        }
    }

    /// The prerender set for the current state: (current ± lookahead) pages
    /// crossed with every purpose that has a known geometry, highest
    /// priority first.
    #[must_use]
    pub fn prerender_set(&self) -> Vec<(RenderKey, Priority)> {
        let mut wanted = Vec::new();
        for (&purpose, &(width, height)) in &self.geometry {
            for distance in 0..=self.lookahead {
                let mut pages = vec![self.current_page + distance];
                if distance > 0 {
                    if let Some(behind) = self.current_page.checked_sub(distance) {
                        pages.push(behind);
                    }
                }
                for page in pages {
                    if page >= self.page_count {
                        continue;
                    }
                    let priority = if purpose.presenter_only() {
                        Priority::PresenterAux
                    } else {
                        match distance {
                            0 => Priority::Current,
                            1 => Priority::Neighbor,
                            _ => Priority::Lookahead,
                        }
                    };
                    let key =
                        RenderKey::quantized(page, purpose, width, height, self.quantize_px);
                    wanted.push((key, priority));
                }
            }
        }
        wanted.sort_by(|a, b| b.1.cmp(&a.1));
        wanted
    }
}

/// Commands that modify navigation state
#[derive(Clone, Debug)]
pub enum Command {
    /// Go to a specific page (clamped to the document)
    GoTo(usize),
    /// Advance one page
    Next,
    /// Go back one page
    Prev,
    /// Record the target pixel size for a display purpose
    SetGeometry {
        purpose: Purpose,
        width: u32,
        height: u32,
    },
    /// Blank or unblank the audience screen
    SetBlanked(bool),
    /// Reload the document
    Reload,
    /// Update the page count
    SetPageCount(usize),
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Tear down overlays on the page being left
    PageExit(usize),
    /// Spin up overlays on the page being entered
    PageEnter(usize),
    /// Cancel stale tasks and submit the fresh prerender set
    RefreshPrerenders,
    /// Invalidate entire cache
    InvalidateCache,
    /// Re-extract document metadata
    ReloadDocument,
    /// Pause every playing overlay
    PauseMedia,
    /// Resume overlays paused by the last blank
    ResumeMedia,
}

/// Owns navigation state and drives cache, scheduler and overlays from it
pub struct NavController {
    state: NavState,
    doc: SharedDocument,
    cache: Arc<BitmapCache>,
    scheduler: PrerenderScheduler,
    overlays: OverlayManager,
}

impl NavController {
    pub fn new(
        doc: SharedDocument,
        cache: Arc<BitmapCache>,
        scheduler: PrerenderScheduler,
        overlays: OverlayManager,
        lookahead: usize,
        quantize_px: u32,
    ) -> Self {
        let state = NavState::new(doc.page_count(), lookahead, quantize_px);
        let mut controller = Self {
            state,
            doc,
            cache,
            scheduler,
            overlays,
        };
        // page 0 is current from the start
        controller.overlays.on_page_enter(0);
        controller
    }

    pub fn goto(&mut self, page: usize) {
        self.dispatch(Command::GoTo(page));
    }

    pub fn next(&mut self) {
        self.dispatch(Command::Next);
    }

    pub fn prev(&mut self) {
        self.dispatch(Command::Prev);
    }

    /// Jump to a named destination. Unknown labels are ignored with a log
    /// entry, never surfaced as an error.
    pub fn jump(&mut self, label: &str) {
        match self.doc.resolve_label(label) {
            Some(page) => self.dispatch(Command::GoTo(page)),
            None => info!("no destination named {label:?}"),
        }
    }

    /// Record a new target size for one display purpose; invalidates the
    /// cache and resubmits with the visible page first
    pub fn resize(&mut self, purpose: Purpose, width: u32, height: u32) {
        self.dispatch(Command::SetGeometry {
            purpose,
            width,
            height,
        });
    }

    pub fn set_blanked(&mut self, blanked: bool) {
        self.dispatch(Command::SetBlanked(blanked));
    }

    pub fn reload(&mut self) {
        self.dispatch(Command::Reload);
    }

    #[must_use]
    pub fn state(&self) -> &NavState {
        &self.state
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    pub fn overlays(&mut self) -> &mut OverlayManager {
        &mut self.overlays
    }

    #[must_use]
    pub fn scheduler(&self) -> &PrerenderScheduler {
        &self.scheduler
    }

    fn dispatch(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::PageExit(page) => self.overlays.on_page_exit(page),
            Effect::PageEnter(page) => self.overlays.on_page_enter(page),
            Effect::RefreshPrerenders => self.refresh_prerenders(),
            Effect::InvalidateCache => {
                self.cache.invalidate_all();
            }
            Effect::ReloadDocument => {
                self.overlays.forget_specs();
                self.state.page_count = self.doc.page_count();
                if self.state.current_page >= self.state.page_count
                    && self.state.page_count > 0
                {
                    self.state.current_page = self.state.page_count - 1;
                }
            }
            Effect::PauseMedia => self.overlays.pause_all(),
            Effect::ResumeMedia => self.overlays.resume_all(),
        }
    }

    /// Cancel everything outside the wanted set, pin the visible keys, and
    /// submit the rest highest priority first
    fn refresh_prerenders(&mut self) {
        let wanted = self.state.prerender_set();
        let wanted_keys: HashSet<RenderKey> = wanted.iter().map(|(key, _)| *key).collect();
        let cancelled = self.scheduler.cancel(|key| !wanted_keys.contains(key));
        if cancelled > 0 {
            debug!("cancelled {cancelled} stale prerenders");
        }
        for (key, priority) in wanted {
            if priority == Priority::Current
                || (key.purpose.presenter_only() && key.page == self.state.current_page)
            {
                self.cache.pin(key);
            }
            if self.cache.contains(&key) {
                continue;
            }
            self.scheduler.submit(PrerenderTask::new(key, priority));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> NavState {
        let mut state = NavState::new(5, 1, 16);
        state.geometry.insert(Purpose::Content, (800, 600));
        state
    }

    #[test]
    fn goto_emits_exit_enter_and_refresh() {
        let mut state = test_state();
        let effects = state.apply(Command::GoTo(2));
        assert_eq!(state.current_page, 2);
        assert_eq!(
            effects,
            vec![
                Effect::PageExit(0),
                Effect::PageEnter(2),
                Effect::RefreshPrerenders,
            ]
        );
    }

    #[test]
    fn goto_same_page_is_inert() {
        let mut state = test_state();
        assert!(state.apply(Command::GoTo(0)).is_empty());
    }

    #[test]
    fn goto_clamps_to_last_page() {
        let mut state = test_state();
        state.apply(Command::GoTo(999));
        assert_eq!(state.current_page, 4);
    }

    #[test]
    fn next_at_last_page_is_a_noop() {
        let mut state = test_state();
        state.apply(Command::GoTo(4));
        assert!(state.apply(Command::Next).is_empty());
        assert_eq!(state.current_page, 4);
    }

    #[test]
    fn prev_at_first_page_is_a_noop() {
        let mut state = test_state();
        assert!(state.apply(Command::Prev).is_empty());
        assert_eq!(state.current_page, 0);
    }

    #[test]
    fn geometry_change_invalidates_and_resubmits() {
        let mut state = test_state();
        let effects = state.apply(Command::SetGeometry {
            purpose: Purpose::Content,
            width: 1920,
            height: 1080,
        });
        assert_eq!(
            effects,
            vec![Effect::InvalidateCache, Effect::RefreshPrerenders]
        );

        // same size again changes nothing
        let effects = state.apply(Command::SetGeometry {
            purpose: Purpose::Content,
            width: 1920,
            height: 1080,
        });
        assert!(effects.is_empty());
    }

    #[test]
    fn blanking_pauses_then_resumes_media() {
        let mut state = test_state();
        assert_eq!(
            state.apply(Command::SetBlanked(true)),
            vec![Effect::PauseMedia]
        );
        assert!(state.apply(Command::SetBlanked(true)).is_empty());
        assert_eq!(
            state.apply(Command::SetBlanked(false)),
            vec![Effect::ResumeMedia]
        );
    }

    #[test]
    fn prerender_set_covers_lookahead_window() {
        let mut state = test_state();
        state.apply(Command::GoTo(2));

        let pages: HashSet<usize> =
            state.prerender_set().iter().map(|(key, _)| key.page).collect();
        assert_eq!(pages, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn prerender_set_is_priority_ordered() {
        let mut state = test_state();
        state.geometry.insert(Purpose::Preview, (320, 240));
        state.apply(Command::GoTo(2));

        let wanted = state.prerender_set();
        let priorities: Vec<Priority> = wanted.iter().map(|(_, p)| p).copied().collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
        assert_eq!(priorities[0], Priority::Current);
        assert_eq!(*priorities.last().unwrap(), Priority::PresenterAux);
    }

    #[test]
    fn prerender_set_clips_at_document_edges() {
        let state = test_state();
        let pages: HashSet<usize> =
            state.prerender_set().iter().map(|(key, _)| key.page).collect();
        assert_eq!(pages, HashSet::from([0, 1]));
    }
}
