//! Byte-bounded LRU store for rendered slide bitmaps.
//!
//! Shared between the UI thread and the render workers; every mutation goes
//! through the internal mutex. Entries backing the currently displayed frame
//! are pinned per purpose and exempt from eviction, so the audience never
//! loses the visible slide to cache pressure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use lru::LruCache;

use super::key::{Bitmap, Purpose, RenderKey};

/// Message sent to subscribers whenever an entry lands in the cache.
///
/// Subscribers drain their receiver on their own thread; `put` never calls
/// back into consumer code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheNotice {
    pub key: RenderKey,
    pub generation: u64,
}

struct CacheEntry {
    bitmap: Arc<Bitmap>,
    #[allow(dead_code)]
    generation: u64,
}

struct Inner {
    // Unbounded LRU; eviction is driven by the byte budget, not entry count,
    // because bitmap sizes vary with zoom.
    lru: LruCache<RenderKey, CacheEntry>,
    bytes: usize,
    pinned: HashMap<Purpose, RenderKey>,
    generation: u64,
    subscribers: Vec<flume::Sender<CacheNotice>>,
}

impl Inner {
    fn is_pinned(&self, key: &RenderKey) -> bool {
        self.pinned.get(&key.purpose) == Some(key)
    }
}

/// Bounded mapping from render key to bitmap with change notification
pub struct BitmapCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl BitmapCache {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::unbounded(),
                bytes: 0,
                pinned: HashMap::new(),
                generation: 0,
                subscribers: Vec::new(),
            }),
            max_bytes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Store or replace an entry, bump the generation counter, evict down to
    /// the byte bound and notify subscribers. Callable from any thread.
    pub fn put(&self, key: RenderKey, bitmap: Arc<Bitmap>) -> u64 {
        let notice;
        {
            let mut inner = self.lock();
            inner.generation += 1;
            let generation = inner.generation;

            if let Some(old) = inner.lru.pop(&key) {
                inner.bytes -= old.bitmap.byte_len();
            }
            inner.bytes += bitmap.byte_len();
            inner.lru.put(key, CacheEntry { bitmap, generation });

            self.evict_locked(&mut inner);

            notice = CacheNotice { key, generation };
            inner.subscribers.retain(|tx| tx.send(notice).is_ok());
        }
        notice.generation
    }

    /// Evict least-recently-used unpinned entries until the byte bound holds
    fn evict_locked(&self, inner: &mut Inner) {
        let mut repin = Vec::new();
        while inner.bytes > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((key, entry)) if inner.is_pinned(&key) => {
                    // Pinned entries back the visible frame; set aside and
                    // re-insert below instead of evicting.
                    repin.push((key, entry));
                }
                Some((key, entry)) => {
                    inner.bytes -= entry.bitmap.byte_len();
                    debug!("evicted {} ({} bytes)", key, entry.bitmap.byte_len());
                }
                None => break,
            }
        }
        for (key, entry) in repin {
            inner.lru.put(key, entry);
        }
    }

    /// Non-blocking lookup; a miss returns immediately
    #[must_use]
    pub fn get(&self, key: &RenderKey) -> Option<Arc<Bitmap>> {
        self.lock().lru.get(key).map(|e| Arc::clone(&e.bitmap))
    }

    /// Check presence without promoting the entry
    #[must_use]
    pub fn contains(&self, key: &RenderKey) -> bool {
        self.lock().lru.contains(key)
    }

    /// Remove all entries matching the predicate (resize, zoom, reload).
    ///
    /// Unlike eviction this also drops pinned entries, since their geometry
    /// is no longer meaningful; the matching pins are cleared.
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RenderKey) -> bool,
    {
        let mut inner = self.lock();
        let doomed: Vec<RenderKey> = inner
            .lru
            .iter()
            .map(|(k, _)| *k)
            .filter(|k| predicate(k))
            .collect();

        for key in &doomed {
            if let Some(entry) = inner.lru.pop(key) {
                inner.bytes -= entry.bitmap.byte_len();
            }
        }
        inner.pinned.retain(|_, key| !predicate(key));
        doomed.len()
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        let mut inner = self.lock();
        inner.lru.clear();
        inner.bytes = 0;
        inner.pinned.clear();
    }

    /// Mark `key` as backing the currently displayed frame for its purpose.
    /// Replaces the previous pin for that purpose.
    pub fn pin(&self, key: RenderKey) {
        self.lock().pinned.insert(key.purpose, key);
    }

    /// Currently pinned key for a purpose
    #[must_use]
    pub fn pinned(&self, purpose: Purpose) -> Option<RenderKey> {
        self.lock().pinned.get(&purpose).copied()
    }

    /// Register a subscriber; notices for every subsequent `put` arrive on
    /// the returned receiver. Disconnected receivers are dropped lazily.
    #[must_use]
    pub fn subscribe(&self) -> flume::Receiver<CacheNotice> {
        let (tx, rx) = flume::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().lru.is_empty()
    }

    /// Current byte usage and the configured bound
    #[must_use]
    pub fn bytes(&self) -> (usize, usize) {
        (self.lock().bytes, self.max_bytes)
    }

    /// Monotonic counter bumped on every `put`
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}
