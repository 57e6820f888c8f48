/*!
 * Payload Pool
 * Bounded, growable pool handing log payloads across threads without copying
 *
 * Relay and parallel logging paths capture a `LogData` into a pooled slot and
 * consume it later, on another thread, without a per-call allocation under
 * steady state. Acquire/release are lock-free: the free list is a bounded
 * MPMC queue, logical capacity grows by compare-and-swap with bounded
 * retries, and exhaustion beyond the hard maximum degrades to a plain
 * allocation plus a rate-limited warning on the static log channel.
 */

use crate::core::static_log;
use crate::data::LogData;
use crate::filter::LogLevel;
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Bounded retries for capacity growth before degrading to unpooled
const GROW_RETRY_LIMIT: usize = 16;

/// Minimum spacing between exhaustion warnings
const WARN_INTERVAL_NS: u64 = 1_000_000_000;

/// Pool sizing, supplied by external configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Logical capacity before the first growth
    pub initial: usize,
    /// Capacity added per exhaustion
    pub increment: usize,
    /// Hard maximum; beyond it acquires degrade to plain allocations
    pub maximum: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial: 64,
            increment: 64,
            maximum: 1024,
        }
    }
}

impl PoolConfig {
    fn normalized(mut self) -> Self {
        self.increment = self.increment.max(1);
        self.initial = self.initial.max(1);
        self.maximum = self.maximum.max(self.initial);
        self
    }
}

/// Pool observability counters
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub capacity: usize,
    pub allocated: usize,
    pub free: usize,
    pub acquires: u64,
    pub releases: u64,
    pub unpooled_fallbacks: u64,
}

struct PoolSlot {
    data: Option<LogData>,
}

struct PoolCore {
    /// Free list, sized at the hard maximum up front
    free: ArrayQueue<Box<PoolSlot>>,
    /// Logical capacity: grows by `increment`, never shrinks
    capacity: AtomicUsize,
    /// Pooled slots created so far (≤ capacity)
    allocated: AtomicUsize,
    config: PoolConfig,
    acquires: AtomicU64,
    releases: AtomicU64,
    unpooled: AtomicU64,
    last_warn_ns: AtomicU64,
}

impl PoolCore {
    fn now_ns() -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }

    fn warn_exhausted(&self) {
        let now = Self::now_ns().max(1);
        let last = self.last_warn_ns.load(Ordering::Relaxed);
        let due = last == 0 || now.saturating_sub(last) >= WARN_INTERVAL_NS;
        if due
            && self
                .last_warn_ns
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            static_log::log(
                LogLevel::Warn,
                format!(
                    "log payload pool exhausted at maximum capacity {}; allocating unpooled",
                    self.config.maximum
                ),
            );
        }
    }
}

/// Cross-thread pool of reusable log payload slots
///
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct LogDataPool {
    core: Arc<PoolCore>,
}

impl LogDataPool {
    pub fn new(config: PoolConfig) -> Self {
        let config = config.normalized();
        Self {
            core: Arc::new(PoolCore {
                free: ArrayQueue::new(config.maximum),
                capacity: AtomicUsize::new(config.initial),
                allocated: AtomicUsize::new(0),
                config,
                acquires: AtomicU64::new(0),
                releases: AtomicU64::new(0),
                unpooled: AtomicU64::new(0),
                last_warn_ns: AtomicU64::new(0),
            }),
        }
    }

    /// Process-wide pool used by the static/parallel logging paths
    pub fn global() -> &'static LogDataPool {
        static GLOBAL: OnceLock<LogDataPool> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new(PoolConfig::default()))
    }

    /// Reserve a slot, growing the pool if needed
    ///
    /// Safe from arbitrary threads; never blocks. Each capacity growth emits
    /// one "pool increased" diagnostic; beyond the hard maximum the entry is
    /// a plain allocation and a rate-limited warning is emitted.
    pub fn acquire(&self) -> PooledLogData {
        let core = &self.core;
        core.acquires.fetch_add(1, Ordering::Relaxed);

        for _ in 0..GROW_RETRY_LIMIT {
            if let Some(slot) = core.free.pop() {
                return PooledLogData {
                    slot: Some(slot),
                    pooled: true,
                    core: Arc::clone(core),
                };
            }

            let allocated = core.allocated.load(Ordering::Relaxed);
            if allocated < core.capacity.load(Ordering::Relaxed) {
                if core
                    .allocated
                    .compare_exchange(allocated, allocated + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    return PooledLogData {
                        slot: Some(Box::new(PoolSlot { data: None })),
                        pooled: true,
                        core: Arc::clone(core),
                    };
                }
                continue;
            }

            let capacity = core.capacity.load(Ordering::Relaxed);
            if capacity >= core.config.maximum {
                break;
            }
            let grown = (capacity + core.config.increment).min(core.config.maximum);
            if core
                .capacity
                .compare_exchange(capacity, grown, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                static_log::log(
                    LogLevel::Warn,
                    format!("log payload pool increased: capacity {capacity} -> {grown}"),
                );
            }
        }

        core.unpooled.fetch_add(1, Ordering::Relaxed);
        core.warn_exhausted();
        PooledLogData {
            slot: Some(Box::new(PoolSlot { data: None })),
            pooled: false,
            core: Arc::clone(core),
        }
    }

    /// Return an entry to the pool
    ///
    /// Equivalent to dropping the entry; provided so relay code can make the
    /// hand-back explicit.
    pub fn release(&self, entry: PooledLogData) {
        debug_assert!(Arc::ptr_eq(&entry.core, &self.core));
        drop(entry);
    }

    /// Current logical capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.core.capacity.load(Ordering::Relaxed),
            allocated: self.core.allocated.load(Ordering::Relaxed),
            free: self.core.free.len(),
            acquires: self.core.acquires.load(Ordering::Relaxed),
            releases: self.core.releases.load(Ordering::Relaxed),
            unpooled_fallbacks: self.core.unpooled.load(Ordering::Relaxed),
        }
    }
}

/// One reserved pool slot holding at most one captured payload
///
/// Dropping the entry clears and returns the slot (pooled entries only).
pub struct PooledLogData {
    slot: Option<Box<PoolSlot>>,
    pooled: bool,
    core: Arc<PoolCore>,
}

impl PooledLogData {
    /// Store a captured payload
    pub fn set(&mut self, data: LogData) {
        if let Some(slot) = self.slot.as_mut() {
            slot.data = Some(data);
        }
    }

    /// Consume the captured payload
    pub fn take(&mut self) -> Option<LogData> {
        self.slot.as_mut().and_then(|slot| slot.data.take())
    }

    /// Borrow the captured payload
    pub fn data(&self) -> Option<&LogData> {
        self.slot.as_ref().and_then(|slot| slot.data.as_ref())
    }

    /// Whether this entry came from the pool (false beyond the hard maximum)
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }
}

impl Drop for PooledLogData {
    fn drop(&mut self) {
        if let Some(mut slot) = self.slot.take() {
            slot.data = None;
            if self.pooled {
                self.core.releases.fetch_add(1, Ordering::Relaxed);
                // Queue is sized at the hard maximum, so the push only fails
                // if slots outnumber capacity, in which case dropping is the
                // right outcome anyway.
                let _ = self.core.free.push(slot);
            }
        }
    }
}
