//! Size-classed pool of idle pixel buffers.
//!
//! The pool keeps buffers that finished their job so later decodes can write
//! into them instead of allocating.
//!
//! # Matching
//!
//! A request is described by a [`PoolKey`] (width, height, config). An idle
//! buffer with exactly that key is preferred. Otherwise the smallest idle
//! buffer of the same config whose allocation can hold the request is handed
//! out and reconfigured in place.
//!
//! # Byte-Budget Eviction
//!
//! The pool tracks the total allocation size of idle buffers. When a `put`
//! pushes it over budget, the oldest idle buffers (by return order) are
//! recycled until the pool fits again. There is no access-frequency
//! weighting: a buffer leaves the idle set on `get`, so return order is the
//! only age that exists.

use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use super::buffer::{PixelBuffer, PixelConfig, PoolKey};
use crate::tracker::MemorySnapshot;

/// Default pool budget: 32MB
pub const DEFAULT_POOL_BUDGET: usize = 32 * 1024 * 1024;

// =============================================================================
// Statistics
// =============================================================================

/// Counters describing pool activity since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// `get` calls answered with a buffer
    pub hits: u64,
    /// `get` calls answered with `None`
    pub misses: u64,
    /// Buffers accepted by `put`
    pub puts: u64,
    /// Buffers refused by `put` (recycled or larger than the budget)
    pub rejected: u64,
    /// Idle buffers recycled to stay within budget
    pub evictions: u64,
    /// Buffers recycled through the bad-buffer path or found recycled while idle
    pub discarded: u64,
}

struct PoolState {
    /// Idle buffers keyed by insertion id; LRU order is return order
    idle: LruCache<u64, PixelBuffer>,
    next_id: u64,
    idle_bytes: usize,
    stats: PoolStats,
}

// =============================================================================
// Pixel Buffer Pool
// =============================================================================

/// Thread-safe pool of reusable pixel buffers with a byte budget.
///
/// # Thread Safety
///
/// All operations take one short-held mutex. No decoding or I/O ever runs
/// while the lock is held, and no operation blocks on anything but the lock.
/// Share the pool across decode runs with `Arc`.
///
/// # Example
///
/// ```
/// use pixreuse::pool::{PixelBuffer, PixelBufferPool, PixelConfig};
///
/// let pool = PixelBufferPool::with_budget(1024 * 1024);
/// let buffer = PixelBuffer::try_new(64, 64, PixelConfig::Rgba8888).unwrap();
/// assert!(pool.put(buffer));
///
/// let reused = pool.get(32, 32, PixelConfig::Rgba8888).unwrap();
/// assert_eq!((reused.width(), reused.height()), (32, 32));
/// assert!(pool.is_empty());
/// ```
pub struct PixelBufferPool {
    state: Mutex<PoolState>,

    /// Maximum total allocation bytes of idle buffers
    max_bytes: usize,
}

impl PixelBufferPool {
    /// Create a pool with the default budget (32MB).
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_POOL_BUDGET)
    }

    /// Create a pool holding at most `max_bytes` of idle allocations.
    ///
    /// A budget of zero disables pooling: every `put` is refused.
    pub fn with_budget(max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: LruCache::unbounded(),
                next_id: 0,
                idle_bytes: 0,
                stats: PoolStats::default(),
            }),
            max_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an idle buffer able to hold a `width` x `height` image.
    ///
    /// The returned buffer is already reconfigured to the requested
    /// dimensions. Returns `None` when no idle buffer qualifies; callers must
    /// then allocate.
    pub fn get(&self, width: u32, height: u32, config: PixelConfig) -> Option<PixelBuffer> {
        let key = PoolKey::new(width, height, config);
        let mut stale = Vec::new();
        let mut state = self.lock();

        let mut exact = None;
        let mut best_fit: Option<(u64, usize)> = None;
        for (id, buffer) in state.idle.iter() {
            if buffer.is_recycled() {
                stale.push(*id);
                continue;
            }
            if buffer.config() != config || !buffer.can_hold(&key) {
                continue;
            }
            if buffer.key() == key {
                exact = Some(*id);
                break;
            }
            let size = buffer.allocation_byte_count();
            if best_fit.map_or(true, |(_, best)| size < best) {
                best_fit = Some((*id, size));
            }
        }

        // Buffers recycled through a handle while idle
        let mut dropped = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(old) = state.idle.pop(&id) {
                state.idle_bytes = state.idle_bytes.saturating_sub(old.allocation_byte_count());
                state.stats.discarded += 1;
                dropped.push(old);
            }
        }

        let mut taken = exact
            .or(best_fit.map(|(id, _)| id))
            .and_then(|id| state.idle.pop(&id));
        if let Some(buffer) = taken.as_mut() {
            state.idle_bytes = state
                .idle_bytes
                .saturating_sub(buffer.allocation_byte_count());
            if !buffer.reconfigure(width, height, config) {
                // Recycled between the scan and now
                state.stats.discarded += 1;
                dropped.extend(taken.take());
            }
        }
        if taken.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        drop(state);

        for mut old in dropped {
            debug!(buffer = ?old, "Dropping idle buffer recycled by another owner");
            old.recycle();
        }
        taken
    }

    /// Return a buffer to the idle set.
    ///
    /// Recycled buffers are refused and leave the idle set unchanged, as are
    /// buffers whose allocation alone exceeds the budget (those are recycled).
    /// Returns `true` if the buffer was accepted.
    pub fn put(&self, mut buffer: PixelBuffer) -> bool {
        if buffer.is_recycled() {
            debug!(?buffer, "Refusing recycled buffer");
            self.lock().stats.rejected += 1;
            return false;
        }

        let size = buffer.allocation_byte_count();
        if size == 0 || size > self.max_bytes {
            debug!(size, budget = self.max_bytes, "Buffer does not fit pool budget, recycling");
            buffer.recycle();
            self.lock().stats.rejected += 1;
            return false;
        }

        let mut evicted = Vec::new();
        {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.idle.put(id, buffer);
            state.idle_bytes += size;
            state.stats.puts += 1;

            while state.idle_bytes > self.max_bytes {
                let Some((_, old)) = state.idle.pop_lru() else {
                    break;
                };
                state.idle_bytes = state.idle_bytes.saturating_sub(old.allocation_byte_count());
                state.stats.evictions += 1;
                evicted.push(old);
            }
        }

        // Free evicted pixels outside the lock
        for mut old in evicted {
            debug!(buffer = ?old, "Evicting idle buffer");
            old.recycle();
        }
        true
    }

    /// Recycle a buffer that a decoder rejected.
    ///
    /// The buffer never re-enters the idle set.
    pub fn discard(&self, mut buffer: PixelBuffer) {
        debug!(?buffer, "Discarding bad reuse buffer");
        buffer.recycle();
        self.lock().stats.discarded += 1;
    }

    /// Evict oldest idle buffers until at most `max_idle_bytes` remain.
    pub fn trim_to(&self, max_idle_bytes: usize) {
        let mut evicted = Vec::new();
        {
            let mut state = self.lock();
            while state.idle_bytes > max_idle_bytes {
                let Some((_, old)) = state.idle.pop_lru() else {
                    break;
                };
                state.idle_bytes = state.idle_bytes.saturating_sub(old.allocation_byte_count());
                state.stats.evictions += 1;
                evicted.push(old);
            }
        }
        for mut old in evicted {
            old.recycle();
        }
    }

    /// Recycle every idle buffer.
    pub fn clear(&self) {
        self.trim_to(0);
    }

    /// Number of idle buffers.
    pub fn len(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().idle.is_empty()
    }

    /// Total allocation bytes of idle buffers.
    pub fn idle_bytes(&self) -> usize {
        self.lock().idle_bytes
    }

    /// Maximum idle bytes.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }

    /// Snapshot of pool memory for failure reports.
    pub fn memory_snapshot(&self) -> MemorySnapshot {
        let idle = self.idle_bytes();
        MemorySnapshot {
            free: self.max_bytes.saturating_sub(idle),
            total: idle,
            max: self.max_bytes,
        }
    }
}

impl Default for PixelBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
