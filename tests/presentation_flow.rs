//! End-to-end navigation flows over an in-memory document: prerender
//! windows, eviction pins, render failures, resizes and overlay lifetimes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pokazka::nav::NavController;
use pokazka::overlay::{OverlayManager, OverlaySpec, PlaybackState, Region};
use pokazka::render::{
    BitmapCache, PrerenderScheduler, Purpose, RenderEvent, RenderKey,
};
use pokazka::test_utils::{FixtureDocument, StubMediaBackend};

const QUANTIZE: u32 = 16;
const W: u32 = 800;
const H: u32 = 600;

struct Rig {
    doc: Arc<FixtureDocument>,
    cache: Arc<BitmapCache>,
    backend: StubMediaBackend,
    events: flume::Receiver<RenderEvent>,
    nav: NavController,
}

fn rig(pages: usize, lookahead: usize, workers: usize) -> Rig {
    let doc = Arc::new(FixtureDocument::new(pages));
    build_rig(doc, lookahead, workers)
}

fn build_rig(doc: Arc<FixtureDocument>, lookahead: usize, workers: usize) -> Rig {
    let shared: pokazka::SharedDocument = doc.clone();
    let cache = Arc::new(BitmapCache::new(64 * 1024 * 1024));
    let scheduler = PrerenderScheduler::new(workers, Arc::clone(&shared), Arc::clone(&cache));
    let events = scheduler.events();
    let backend = StubMediaBackend::new();
    let overlays = OverlayManager::new(Arc::clone(&shared), Box::new(backend.clone()));
    let nav = NavController::new(
        shared,
        Arc::clone(&cache),
        scheduler,
        overlays,
        lookahead,
        QUANTIZE,
    );
    Rig {
        doc,
        cache,
        backend,
        events,
        nav,
    }
}

fn content_key(page: usize) -> RenderKey {
    RenderKey::quantized(page, Purpose::Content, W, H, QUANTIZE)
}

fn wait_for_completion(events: &flume::Receiver<RenderEvent>, key: RenderKey) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(RenderEvent::Completed { key: done, .. }) if done == key => return,
            Ok(RenderEvent::Failed { key: failed, .. }) if failed == key => {
                panic!("render of {key} failed instead of completing")
            }
            Ok(_) | Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
    panic!("timed out waiting for {key}");
}

fn wait_for_failure(events: &flume::Receiver<RenderEvent>, key: RenderKey) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(RenderEvent::Failed { key: failed, .. }) if failed == key => return,
            Ok(_) | Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
    panic!("timed out waiting for failure of {key}");
}

fn overlay_on(page: usize, source: &str) -> OverlaySpec {
    OverlaySpec {
        page,
        region: Region::new(0.1, 0.1, 0.5, 0.5),
        source: PathBuf::from(source),
        autoplay: true,
        loop_playback: false,
        persist: false,
        show_controls: true,
    }
}

#[test]
fn prerender_window_tracks_navigation() {
    let mut r = rig(5, 1, 0);
    r.nav.resize(Purpose::Content, W, H);
    r.nav.goto(2);

    for page in [1, 2, 3] {
        assert!(
            r.nav.scheduler().is_pending(&content_key(page)),
            "page {page} should be queued"
        );
    }
    assert!(!r.nav.scheduler().is_pending(&content_key(0)));
    assert!(!r.nav.scheduler().is_pending(&content_key(4)));

    r.nav.next();
    for page in [2, 3, 4] {
        assert!(
            r.nav.scheduler().is_pending(&content_key(page)),
            "page {page} should be queued after next()"
        );
    }
    assert!(!r.nav.scheduler().is_pending(&content_key(1)));
}

#[test]
fn current_page_stays_pinned_as_navigation_moves() {
    let mut r = rig(5, 1, 0);
    r.nav.resize(Purpose::Content, W, H);

    r.nav.goto(2);
    assert_eq!(r.cache.pinned(Purpose::Content), Some(content_key(2)));

    r.nav.next();
    // page 2's entry is eviction-eligible again, page 3's is protected
    assert_eq!(r.cache.pinned(Purpose::Content), Some(content_key(3)));
}

#[test]
fn navigation_fills_the_cache_for_the_visible_page() {
    let mut r = rig(5, 1, 2);
    r.nav.resize(Purpose::Content, W, H);
    r.nav.goto(2);

    wait_for_completion(&r.events, content_key(2));
    assert!(r.cache.contains(&content_key(2)));
    let key = content_key(2);
    let bitmap = r.cache.get(&key).unwrap();
    // workers render at the key's quantized geometry
    assert_eq!((bitmap.width, bitmap.height), (key.width, key.height));
    assert!(r.doc.render_calls() >= 1);
}

#[test]
fn failed_render_is_a_persistent_miss_not_a_crash() {
    let doc = Arc::new(FixtureDocument::new(5));
    doc.fail_page(4);
    let mut r = build_rig(doc, 0, 2);
    r.nav.resize(Purpose::Content, W, H);
    r.nav.goto(4);

    wait_for_failure(&r.events, content_key(4));
    assert!(r.cache.get(&content_key(4)).is_none());

    // navigation keeps working afterwards
    r.nav.prev();
    wait_for_completion(&r.events, content_key(3));
    assert!(r.cache.contains(&content_key(3)));
    assert!(!r.cache.contains(&content_key(4)));
}

#[test]
fn resize_invalidates_and_requeues_current_page_first() {
    let mut r = rig(5, 1, 2);
    r.nav.resize(Purpose::Content, W, H);
    r.nav.goto(2);
    wait_for_completion(&r.events, content_key(2));

    let generation_before = r.cache.generation();
    r.nav.resize(Purpose::Content, 1920, 1080);

    // old geometry entries are gone
    assert!(!r.cache.contains(&content_key(2)));

    let new_key = RenderKey::quantized(2, Purpose::Content, 1920, 1080, QUANTIZE);
    wait_for_completion(&r.events, new_key);
    assert!(r.cache.contains(&new_key));
    assert!(r.cache.generation() > generation_before);
}

#[test]
fn label_jump_resolves_through_the_document() {
    let doc = Arc::new(FixtureDocument::new(10));
    doc.add_label("conclusion", 8);
    let mut r = build_rig(doc, 0, 0);
    r.nav.resize(Purpose::Content, W, H);

    r.nav.jump("conclusion");
    assert_eq!(r.nav.current_page(), 8);

    // unknown labels are ignored, not errors
    r.nav.jump("no-such-label");
    assert_eq!(r.nav.current_page(), 8);
}

#[test]
fn overlay_follows_page_transitions() {
    let doc = Arc::new(FixtureDocument::new(5));
    let spec = overlay_on(3, "clip.mp4");
    let key = spec.key();
    doc.add_overlay(spec);
    let mut r = build_rig(doc, 0, 0);

    r.nav.goto(3);
    assert_eq!(r.nav.overlays().instance_count(3), 1);
    assert_eq!(r.nav.overlays().state(key), Some(PlaybackState::Playing));

    r.nav.next();
    assert_eq!(r.nav.overlays().instance_count(3), 0);

    // re-entering starts over with a fresh instance
    r.nav.prev();
    assert_eq!(r.nav.overlays().state(key), Some(PlaybackState::Playing));
    assert_eq!(r.backend.open_count(), 2);
}

#[test]
fn blanking_pauses_overlays_and_unblanking_resumes() {
    let doc = Arc::new(FixtureDocument::new(5));
    let spec = overlay_on(1, "clip.mp4");
    let key = spec.key();
    doc.add_overlay(spec);
    let mut r = build_rig(doc, 0, 0);

    r.nav.goto(1);
    r.nav.set_blanked(true);
    assert_eq!(r.nav.overlays().state(key), Some(PlaybackState::Paused));

    r.nav.set_blanked(false);
    assert_eq!(r.nav.overlays().state(key), Some(PlaybackState::Playing));
}

#[test]
fn persistent_audio_spans_pages() {
    let doc = Arc::new(FixtureDocument::new(5));
    let mut spec = overlay_on(0, "soundtrack.ogg");
    spec.persist = true;
    let key = spec.key();
    doc.add_overlay(spec);
    let mut r = build_rig(doc, 0, 0);

    // page 0 is entered on construction
    assert_eq!(r.nav.overlays().state(key), Some(PlaybackState::Playing));
    r.nav.goto(3);
    assert_eq!(r.nav.overlays().state(key), Some(PlaybackState::Playing));
    assert_eq!(r.backend.open_count(), 1);
}
