//! Prerender task and completion event types

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::doc::RenderFault;
use super::key::RenderKey;

/// Service order for queued prerender tasks.
///
/// The scheduler pops the highest priority first; completion order is still
/// unordered because render times vary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Presenter-only variants (preview thumbnails, notes)
    PresenterAux = 0,
    /// Lookahead beyond the immediate neighbors
    Lookahead = 1,
    /// Pages adjacent to the current one
    Neighbor = 2,
    /// The currently displayed page
    Current = 3,
}

/// One unit of background render work.
///
/// Created by the navigation controller, queued at most once per key,
/// executed at most once unless cancelled first. Cancellation is checked
/// before the result is written back, never mid-render.
#[derive(Clone, Debug)]
pub struct PrerenderTask {
    pub key: RenderKey,
    pub priority: Priority,
    cancelled: Arc<AtomicBool>,
}

impl PrerenderTask {
    #[must_use]
    pub fn new(key: RenderKey, priority: Priority) -> Self {
        Self {
            key,
            priority,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the task stale; a result completing afterwards is discarded
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Re-queue entry sharing an existing cancellation flag (priority raise)
    pub(crate) fn with_flag(key: RenderKey, priority: Priority, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            key,
            priority,
            cancelled,
        }
    }
}

/// Completion notifications delivered from worker threads to the UI thread
#[derive(Debug)]
pub enum RenderEvent {
    /// Bitmap rendered and stored in the cache
    Completed { key: RenderKey, generation: u64 },

    /// Render failed; the key stays a cache miss until resubmitted
    Failed { key: RenderKey, fault: RenderFault },

    /// Task was cancelled before write-back; result dropped
    Discarded { key: RenderKey },
}

impl RenderEvent {
    #[must_use]
    pub fn key(&self) -> &RenderKey {
        match self {
            RenderEvent::Completed { key, .. }
            | RenderEvent::Failed { key, .. }
            | RenderEvent::Discarded { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::key::Purpose;

    #[test]
    fn priority_ordering_matches_service_order() {
        assert!(Priority::Current > Priority::Neighbor);
        assert!(Priority::Neighbor > Priority::Lookahead);
        assert!(Priority::Lookahead > Priority::PresenterAux);
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let task = PrerenderTask::new(
            RenderKey::quantized(0, Purpose::Content, 800, 600, 16),
            Priority::Current,
        );
        let clone = task.clone();
        assert!(!clone.is_cancelled());
        task.cancel();
        assert!(clone.is_cancelled());
    }
}
