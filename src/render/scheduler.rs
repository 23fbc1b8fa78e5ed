//! Background prerender scheduler.
//!
//! A fixed pool of worker threads pulls the highest-priority non-stale task
//! from a shared queue, invokes the document's (blocking) render call and
//! writes the bitmap into the cache. The UI thread never blocks here; it
//! learns about completions by draining the event receiver.
//!
//! Duplicate submissions for the same key coalesce to one in-flight task.
//! Cancellation is opportunistic: render calls are not interruptible, so a
//! stale task is checked right before write-back and its result dropped,
//! which keeps "the displayed page reflects the latest navigation" without
//! killing threads mid-call.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};

use crate::doc::SharedDocument;
use super::cache::BitmapCache;
use super::key::RenderKey;
use super::request::{PrerenderTask, Priority, RenderEvent};

struct QueuedTask {
    seq: u64,
    task: PrerenderTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}
impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // Max-heap: higher priority first, earlier submission wins ties
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Queued,
    Running,
}

struct Tracked {
    flag: Arc<AtomicBool>,
    priority: Priority,
    state: TaskState,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    index: HashMap<RenderKey, Tracked>,
    seq: u64,
}

/// Worker pool feeding the bitmap cache
pub struct PrerenderScheduler {
    queue: Arc<Mutex<QueueState>>,
    wake_tx: flume::Sender<()>,
    events_rx: flume::Receiver<RenderEvent>,
    _handles: Vec<thread::JoinHandle<()>>,
}

impl PrerenderScheduler {
    /// Spawn `workers` render threads over the given document and cache.
    ///
    /// Zero workers is allowed (tests drive the queue without consuming it).
    #[must_use]
    pub fn new(workers: usize, doc: SharedDocument, cache: Arc<BitmapCache>) -> Self {
        let queue = Arc::new(Mutex::new(QueueState::default()));
        let (wake_tx, wake_rx) = flume::unbounded::<()>();
        let (events_tx, events_rx) = flume::unbounded::<RenderEvent>();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let wake_rx = wake_rx.clone();
            let events_tx = events_tx.clone();
            let doc = Arc::clone(&doc);
            let cache = Arc::clone(&cache);

            let handle = thread::Builder::new()
                .name(format!("pokazka-render-{worker_id}"))
                .spawn(move || {
                    debug!("render worker {worker_id} started");
                    while wake_rx.recv().is_ok() {
                        if let Some(task) = claim(&queue) {
                            run_task(&task, &queue, &doc, &cache, &events_tx);
                        }
                    }
                    debug!("render worker {worker_id} stopped");
                })
                .expect("failed to spawn render worker");
            handles.push(handle);
        }

        Self {
            queue,
            wake_tx,
            events_rx,
            _handles: handles,
        }
    }

    /// Enqueue a prerender task. Returns `false` when the submission
    /// coalesced with a task already queued or in flight for the same key.
    pub fn submit(&self, task: PrerenderTask) -> bool {
        enum Action {
            Track,
            Requeue(Arc<AtomicBool>),
            Coalesce,
        }

        let mut q = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let action = match q.index.get_mut(&task.key) {
            // A cancelled predecessor may still be mid-render; its result is
            // dropped at write-back, so a fresh task for the key is correct.
            Some(tracked) if tracked.flag.load(Ordering::Relaxed) => Action::Track,
            // Navigation can promote an already-queued page (lookahead page
            // becomes current). Re-queue under the same flag at the higher
            // priority; the stale heap entry is skipped when popped.
            Some(tracked)
                if task.priority > tracked.priority && tracked.state == TaskState::Queued =>
            {
                tracked.priority = task.priority;
                Action::Requeue(Arc::clone(&tracked.flag))
            }
            Some(_) => Action::Coalesce,
            None => Action::Track,
        };

        let queued = match action {
            Action::Track => {
                q.index.insert(
                    task.key,
                    Tracked {
                        flag: task.cancel_flag(),
                        priority: task.priority,
                        state: TaskState::Queued,
                    },
                );
                task
            }
            Action::Requeue(flag) => PrerenderTask::with_flag(task.key, task.priority, flag),
            Action::Coalesce => {
                debug!("coalesced duplicate submit for {}", task.key);
                return false;
            }
        };

        q.seq += 1;
        let seq = q.seq;
        q.heap.push(QueuedTask { seq, task: queued });
        drop(q);

        let _ = self.wake_tx.send(());
        true
    }

    /// Mark all matching queued/in-flight tasks stale. Queued tasks are
    /// dropped before service; in-flight tasks finish but their results are
    /// discarded instead of written back.
    pub fn cancel<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RenderKey) -> bool,
    {
        let mut q = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut cancelled = 0;
        q.index.retain(|key, tracked| {
            if !predicate(key) {
                return true;
            }
            tracked.flag.store(true, Ordering::Relaxed);
            cancelled += 1;
            // Running tasks stay tracked until write-back; queued ones can
            // be forgotten right away, which permits resubmission.
            tracked.state == TaskState::Running
        });
        cancelled
    }

    /// Number of keys queued or in flight
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .index
            .len()
    }

    /// Whether a task for this key is queued or in flight
    #[must_use]
    pub fn is_pending(&self, key: &RenderKey) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .index
            .contains_key(key)
    }

    /// Drain all completion events delivered so far (UI thread)
    pub fn poll_events(&self) -> Vec<RenderEvent> {
        let mut events = vec![];
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receiver handle for blocking waits (tests, shutdown sync)
    #[must_use]
    pub fn events(&self) -> flume::Receiver<RenderEvent> {
        self.events_rx.clone()
    }
}

// Dropping the scheduler drops the wake sender; workers leave their recv
// loop and exit.

/// Pop the highest-priority live task and mark it running
fn claim(queue: &Mutex<QueueState>) -> Option<PrerenderTask> {
    let mut q = queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    while let Some(entry) = q.heap.pop() {
        let key = entry.task.key;
        let Some(tracked) = q.index.get_mut(&key) else {
            // Cancelled while queued, or a superseded duplicate
            continue;
        };
        if !Arc::ptr_eq(&tracked.flag, &entry.task.cancel_flag()) {
            continue;
        }
        if entry.task.is_cancelled() {
            q.index.remove(&key);
            continue;
        }
        if tracked.state == TaskState::Running {
            continue;
        }
        tracked.state = TaskState::Running;
        return Some(entry.task);
    }
    None
}

fn run_task(
    task: &PrerenderTask,
    queue: &Mutex<QueueState>,
    doc: &SharedDocument,
    cache: &BitmapCache,
    events: &flume::Sender<RenderEvent>,
) {
    let key = task.key;
    let result = doc.render(key.page, key.width, key.height);

    let event = match result {
        Ok(_) if task.is_cancelled() => {
            debug!("dropping stale render result for {}", key);
            RenderEvent::Discarded { key }
        }
        Ok(bitmap) => {
            let generation = cache.put(key, Arc::new(bitmap));
            RenderEvent::Completed { key, generation }
        }
        Err(fault) => {
            warn!("render failed for {}: {}", key, fault);
            RenderEvent::Failed { key, fault }
        }
    };
    let _ = events.send(event);

    let mut q = queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(tracked) = q.index.get(&key) {
        // A fresh resubmission may already have replaced a cancelled run;
        // only clear the entry if it is still ours.
        if Arc::ptr_eq(&tracked.flag, &task.cancel_flag()) {
            q.index.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::key::Purpose;
    use crate::test_utils::FixtureDocument;
    use std::time::Duration;

    fn key(page: usize) -> RenderKey {
        RenderKey::quantized(page, Purpose::Content, 320, 240, 16)
    }

    fn fixture(pages: usize) -> (Arc<FixtureDocument>, SharedDocument) {
        let doc = Arc::new(FixtureDocument::new(pages));
        let shared: SharedDocument = doc.clone();
        (doc, shared)
    }

    #[test]
    fn duplicate_submissions_coalesce() {
        let (_, doc) = fixture(5);
        let cache = Arc::new(BitmapCache::new(64 << 20));
        // No workers: the queue state is observable without races
        let scheduler = PrerenderScheduler::new(0, doc, cache);

        assert!(scheduler.submit(PrerenderTask::new(key(1), Priority::Neighbor)));
        assert!(!scheduler.submit(PrerenderTask::new(key(1), Priority::Neighbor)));
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn promoting_a_queued_key_keeps_one_pending_task() {
        let (_, doc) = fixture(5);
        let cache = Arc::new(BitmapCache::new(64 << 20));
        let scheduler = PrerenderScheduler::new(0, doc, cache);

        scheduler.submit(PrerenderTask::new(key(2), Priority::Lookahead));
        assert!(scheduler.submit(PrerenderTask::new(key(2), Priority::Current)));
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn coalesced_submissions_render_once() {
        let (fixture_doc, doc) = fixture(5);
        fixture_doc.set_render_delay(Duration::from_millis(30));
        let cache = Arc::new(BitmapCache::new(64 << 20));
        let scheduler = PrerenderScheduler::new(2, doc, Arc::clone(&cache));

        scheduler.submit(PrerenderTask::new(key(0), Priority::Current));
        scheduler.submit(PrerenderTask::new(key(0), Priority::Current));

        let events = scheduler.events();
        let event = events
            .recv_timeout(Duration::from_secs(5))
            .expect("render should complete");
        assert!(matches!(event, RenderEvent::Completed { .. }));
        assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
        assert_eq!(fixture_doc.render_calls(), 1);
        assert!(cache.contains(&key(0)));
    }

    #[test]
    fn cancelled_queued_task_is_never_rendered() {
        let (fixture_doc, doc) = fixture(5);
        let cache = Arc::new(BitmapCache::new(64 << 20));
        let scheduler = PrerenderScheduler::new(0, doc, cache);

        scheduler.submit(PrerenderTask::new(key(3), Priority::Lookahead));
        assert_eq!(scheduler.cancel(|k| k.page == 3), 1);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(fixture_doc.render_calls(), 0);
    }

    #[test]
    fn stale_in_flight_result_is_discarded_not_cached() {
        let (fixture_doc, doc) = fixture(5);
        fixture_doc.set_render_delay(Duration::from_millis(150));
        let cache = Arc::new(BitmapCache::new(64 << 20));
        let scheduler = PrerenderScheduler::new(1, doc, Arc::clone(&cache));

        scheduler.submit(PrerenderTask::new(key(4), Priority::Current));
        // Give the worker time to start the (slow) render, then cancel
        std::thread::sleep(Duration::from_millis(40));
        scheduler.cancel(|k| k.page == 4);

        let event = scheduler
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("event expected");
        assert!(matches!(event, RenderEvent::Discarded { .. }));
        assert!(!cache.contains(&key(4)));
    }

    #[test]
    fn render_failure_surfaces_as_failed_event_and_miss() {
        let (fixture_doc, doc) = fixture(5);
        fixture_doc.fail_page(4);
        let cache = Arc::new(BitmapCache::new(64 << 20));
        let scheduler = PrerenderScheduler::new(1, doc, Arc::clone(&cache));

        scheduler.submit(PrerenderTask::new(key(4), Priority::Current));
        let event = scheduler
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("event expected");
        assert!(matches!(event, RenderEvent::Failed { .. }));
        assert!(!cache.contains(&key(4)));

        // The pool keeps serving after a failure
        scheduler.submit(PrerenderTask::new(key(0), Priority::Current));
        let event = scheduler
            .events()
            .recv_timeout(Duration::from_secs(5))
            .expect("event expected");
        assert!(matches!(event, RenderEvent::Completed { .. }));
    }

    #[test]
    fn higher_priority_tasks_are_served_first() {
        let (_doc, doc) = fixture(10);
        let cache = Arc::new(BitmapCache::new(64 << 20));
        let scheduler = PrerenderScheduler::new(0, doc, cache);

        scheduler.submit(PrerenderTask::new(key(7), Priority::Lookahead));
        scheduler.submit(PrerenderTask::new(key(5), Priority::Current));
        scheduler.submit(PrerenderTask::new(key(6), Priority::Neighbor));

        let first = claim(&scheduler.queue).expect("task");
        assert_eq!(first.key.page, 5);
        let second = claim(&scheduler.queue).expect("task");
        assert_eq!(second.key.page, 6);
        let third = claim(&scheduler.queue).expect("task");
        assert_eq!(third.key.page, 7);
    }
}
