//! Shared evaluation cache and request sets.
//!
//! [`EvalContext`] is the single piece of state shared between self-play
//! workers and the inference broker: a canonical-key → evaluation cache and
//! the pending/processing request sets. It is an explicitly passed,
//! `Arc`-shared object with its own lifecycle (`new`, `clear`), never a
//! process-wide singleton, so independent generations and tests cannot
//! cross-contaminate.
//!
//! Locking is coarse but short: one mutex over the cache map (paired with a
//! condvar for waiters) and one mutex over both request sets. Critical
//! sections only touch the map or the sets and release immediately.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use crate::game::GameState;
use crate::{EngineError, Result};

/// One published evaluation: normalized priors over exactly the legal moves
/// at the position, plus the scalar value estimate in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct CacheEntry<M> {
    pub priors: Vec<(M, f32)>,
    pub value: f32,
}

struct CacheState<M> {
    entries: HashMap<String, Arc<CacheEntry<M>>>,
    shutdown: bool,
}

/// Pending keys await the next batch; processing keys are in flight for the
/// current one. A key lives in at most one of {pending, processing, cache}.
#[derive(Default)]
struct RequestState {
    pending: HashSet<String>,
    processing: HashSet<String>,
}

pub struct EvalContext<G: GameState> {
    cache: Mutex<CacheState<G::Move>>,
    ready: Condvar,
    requests: Mutex<RequestState>,
}

impl<G: GameState> EvalContext<G> {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(CacheState {
                entries: HashMap::new(),
                shutdown: false,
            }),
            ready: Condvar::new(),
            requests: Mutex::new(RequestState::default()),
        }
    }

    /// Cache lookup. Entries are shared, never copied out.
    pub fn lookup(&self, key: &str) -> Option<Arc<CacheEntry<G::Move>>> {
        let cache = self.cache.lock().unwrap();
        cache.entries.get(key).cloned()
    }

    /// Registers a key for the next batch. No-op when the key is already
    /// cached, pending or in flight, so well-behaved callers and races both
    /// preserve the at-most-one-home invariant.
    pub fn request(&self, key: &str) {
        if self.lookup(key).is_some() {
            return;
        }
        let mut requests = self.requests.lock().unwrap();
        if !requests.processing.contains(key) && !requests.pending.contains(key) {
            requests.pending.insert(key.to_owned());
        }
    }

    /// Blocks until the broker publishes `key`, waking through the condvar
    /// rather than a sleep-poll. Errors out instead of hanging when the
    /// context is shut down underneath the waiter.
    pub fn wait(&self, key: &str) -> Result<Arc<CacheEntry<G::Move>>> {
        let mut cache = self.cache.lock().unwrap();
        loop {
            if let Some(entry) = cache.entries.get(key) {
                return Ok(Arc::clone(entry));
            }
            if cache.shutdown {
                return Err(EngineError::Shutdown(key.to_owned()));
            }
            cache = self.ready.wait(cache).unwrap();
        }
    }

    /// Publishes one evaluation and wakes every waiter.
    ///
    /// Idempotent: the key uniquely determines the legal-move set, so a
    /// second batch racing on the same key must produce identical content
    /// and its write is dropped. Divergence is reported as a bug.
    pub fn publish(&self, key: String, entry: CacheEntry<G::Move>) {
        let mut cache = self.cache.lock().unwrap();
        if let Some(existing) = cache.entries.get(&key) {
            if existing.priors.len() != entry.priors.len() {
                log::error!(
                    "divergent cache publication for `{key}`: {} legal moves cached, {} published",
                    existing.priors.len(),
                    entry.priors.len()
                );
                debug_assert!(false, "divergent cache publication for `{key}`");
            }
            return;
        }
        let _ = cache.entries.insert(key, Arc::new(entry));
        drop(cache);
        self.ready.notify_all();
    }

    /// Atomically moves the pending set into processing and returns the
    /// batch. Search threads keep appending to pending for the *next* batch
    /// while this one is computed. Broker-only: the previous batch must have
    /// been cleared with [`Self::finish_batch`] before starting another.
    pub(crate) fn begin_batch(&self) -> Vec<String> {
        let mut requests = self.requests.lock().unwrap();
        debug_assert!(requests.processing.is_empty());
        requests.processing = std::mem::take(&mut requests.pending);
        requests.processing.iter().cloned().collect()
    }

    /// Clears the processing set once the batch has been published.
    pub(crate) fn finish_batch(&self) {
        let mut requests = self.requests.lock().unwrap();
        requests.processing.clear();
    }

    /// Wakes every waiter with [`EngineError::Shutdown`] and makes further
    /// waits fail fast. Called by the broker on stop or on a fatal
    /// invariant violation.
    pub fn shutdown(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.shutdown = true;
        drop(cache);
        self.ready.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cache.lock().unwrap().shutdown
    }

    /// Drops all cached evaluations and queued requests. Must be called
    /// between generations: entries are never invalidated within one, but go
    /// stale the moment the evaluator's weights change.
    pub fn clear(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.entries.clear();
        drop(cache);
        let mut requests = self.requests.lock().unwrap();
        requests.pending.clear();
        requests.processing.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<G: GameState> Default for EvalContext<G> {
    fn default() -> Self {
        Self::new()
    }
}
