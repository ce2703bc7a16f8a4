//! Thread-safe LRU generation cache with single-flight pending entries.
//!
//! A chunk id is in exactly one of three states: absent, pending (context
//! only), or complete (chunk only). Pending doubles as the single-flight
//! token: the second requester awaits the first completion instead of
//! generating again. All bookkeeping, including the LRU touch on reads,
//! happens inside one critical section.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::watch;

use game_domain::{ChunkId, WorldChunk};

use super::GenerationContext;

/// What a caller should do for a given chunk id.
pub enum CacheState {
    Complete(WorldChunk),
    /// Await this receiver, then re-check.
    Pending(watch::Receiver<bool>),
    Absent,
}

struct PendingEntry {
    ctx: GenerationContext,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

#[derive(Default)]
struct CacheInner {
    complete: HashMap<ChunkId, WorldChunk>,
    /// Front is most recently used.
    order: VecDeque<ChunkId>,
    pending: HashMap<ChunkId, PendingEntry>,
}

impl CacheInner {
    fn touch(&mut self, id: ChunkId) {
        if let Some(pos) = self.order.iter().position(|c| *c == id) {
            self.order.remove(pos);
        }
        self.order.push_front(id);
    }
}

pub struct GenerationCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl GenerationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Mark a chunk as in-flight. Returns false (and changes nothing) if
    /// the id is already pending or complete.
    pub fn cache_pending(&self, id: ChunkId, ctx: GenerationContext) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending.contains_key(&id) || inner.complete.contains_key(&id) {
            return false;
        }
        let (done_tx, done_rx) = watch::channel(false);
        inner.pending.insert(
            id,
            PendingEntry {
                ctx,
                done_tx,
                done_rx,
            },
        );
        true
    }

    /// Finish an in-flight generation: drop the pending token, wake the
    /// waiters, insert as most recently used, evict beyond capacity.
    pub fn cache_complete(&self, id: ChunkId, chunk: WorldChunk) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.pending.remove(&id) {
            let _ = entry.done_tx.send(true);
        }
        inner.complete.insert(id, chunk);
        inner.touch(id);
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_back() {
                inner.complete.remove(&evicted);
                tracing::debug!(chunk = %evicted, "evicted chunk from generation cache");
            }
        }
    }

    /// Drop a pending token without completing (generation failed or was
    /// cancelled). Waiters wake and observe the id as absent.
    pub fn clear_pending(&self, id: ChunkId) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.pending.remove(&id) {
            let _ = entry.done_tx.send(true);
        }
    }

    /// Fetch a completed chunk, marking it most recently used.
    pub fn get_cached(&self, id: ChunkId) -> Option<WorldChunk> {
        let mut inner = self.inner.lock();
        let chunk = inner.complete.get(&id).cloned()?;
        inner.touch(id);
        Some(chunk)
    }

    pub fn state_of(&self, id: ChunkId) -> CacheState {
        let mut inner = self.inner.lock();
        if let Some(chunk) = inner.complete.get(&id).cloned() {
            inner.touch(id);
            return CacheState::Complete(chunk);
        }
        if let Some(entry) = inner.pending.get(&id) {
            return CacheState::Pending(entry.done_rx.clone());
        }
        CacheState::Absent
    }

    pub fn is_pending(&self, id: ChunkId) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    pub fn get_pending_context(&self, id: ChunkId) -> Option<GenerationContext> {
        self.inner.lock().pending.get(&id).map(|e| e.ctx.clone())
    }

    pub fn size(&self) -> usize {
        self.inner.lock().complete.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for (_, entry) in inner.pending.drain() {
            let _ = entry.done_tx.send(true);
        }
        inner.complete.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_domain::ChunkLevel;

    fn chunk() -> WorldChunk {
        WorldChunk::new(ChunkLevel::Subzone, None)
    }

    fn ctx(id: ChunkId) -> GenerationContext {
        GenerationContext::root(id, 7)
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = GenerationCache::new(3);
        let chunks: Vec<WorldChunk> = (0..5).map(|_| chunk()).collect();
        let ids: Vec<ChunkId> = chunks.iter().map(|c| c.id).collect();

        for c in &chunks[..4] {
            cache.cache_complete(c.id, c.clone());
        }
        // c1 was oldest of the four.
        assert!(cache.get_cached(ids[0]).is_none());
        assert!(cache.get_cached(ids[1]).is_some());
        assert!(cache.get_cached(ids[2]).is_some());
        assert!(cache.get_cached(ids[3]).is_some());

        // Touch c2, insert c5; c3 is now the eviction victim.
        cache.get_cached(ids[1]);
        cache.cache_complete(ids[4], chunks[4].clone());
        assert!(cache.get_cached(ids[2]).is_none());
        assert!(cache.get_cached(ids[1]).is_some());
        assert!(cache.get_cached(ids[3]).is_some());
        assert!(cache.get_cached(ids[4]).is_some());
        assert_eq!(cache.size(), 3);
    }

    #[test]
    fn id_is_in_exactly_one_state() {
        let cache = GenerationCache::new(4);
        let c = chunk();

        assert!(matches!(cache.state_of(c.id), CacheState::Absent));

        assert!(cache.cache_pending(c.id, ctx(c.id)));
        assert!(cache.is_pending(c.id));
        assert!(cache.get_cached(c.id).is_none());
        // A second pending claim on the same id is refused.
        assert!(!cache.cache_pending(c.id, ctx(c.id)));

        cache.cache_complete(c.id, c.clone());
        assert!(!cache.is_pending(c.id));
        assert!(cache.get_pending_context(c.id).is_none());
        assert!(cache.get_cached(c.id).is_some());
        // Completed ids cannot be claimed pending again.
        assert!(!cache.cache_pending(c.id, ctx(c.id)));
    }

    #[tokio::test]
    async fn waiters_wake_on_completion() {
        let cache = std::sync::Arc::new(GenerationCache::new(4));
        let c = chunk();
        let id = c.id;
        assert!(cache.cache_pending(id, ctx(id)));

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let CacheState::Pending(mut rx) = cache.state_of(id) else {
                    panic!("expected pending");
                };
                rx.changed().await.ok();
                cache.get_cached(id)
            })
        };

        cache.cache_complete(id, c);
        let seen = waiter.await.unwrap();
        assert!(seen.is_some());
    }

    #[test]
    fn clear_pending_leaves_id_absent() {
        let cache = GenerationCache::new(4);
        let id = ChunkId::new();
        cache.cache_pending(id, ctx(id));
        cache.clear_pending(id);
        assert!(matches!(cache.state_of(id), CacheState::Absent));
        assert_eq!(cache.pending_count(), 0);
    }
}
