/*!
 * Ownership Sentinel
 * CAS-based single-logical-owner guard for monitor state
 */

use crate::core::errors::MonitorError;
use parking_lot::Mutex;
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU64, Ordering};

/// Idle sentinel value (no owner)
const IDLE: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Dense per-thread token, never zero
///
/// `std::thread::ThreadId` has no stable integer form, so threads draw a
/// token from a process-wide counter on first use.
#[inline]
pub fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Single-logical-owner cell
///
/// Holds `IDLE` or the owning thread's token. Acquisition is one
/// compare-and-swap; there is no waiting and no queue. A failed swap is
/// classified by who holds the cell:
/// - the same thread: reentrancy (a call path re-entered the monitor)
/// - a different thread: concurrent access
///
/// Both are caller bugs and surface as errors rather than serializing.
#[derive(Debug)]
pub struct OwnerCell {
    owner: AtomicU64,
    /// Owner call stack, captured only when diagnostics request it
    owner_stack: Mutex<Option<String>>,
}

impl OwnerCell {
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(IDLE),
            owner_stack: Mutex::new(None),
        }
    }

    /// Acquire exclusive logical ownership for the current thread
    ///
    /// With `capture_stack` set, the owner's call stack is recorded so a
    /// losing thread can report where the owner is stuck.
    pub fn try_acquire(&self, capture_stack: bool) -> Result<OwnerToken<'_>, MonitorError> {
        let me = current_thread_token();
        match self
            .owner
            .compare_exchange(IDLE, me, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => {
                if capture_stack {
                    *self.owner_stack.lock() = Some(Backtrace::force_capture().to_string());
                }
                Ok(OwnerToken {
                    cell: self,
                    _pinned: std::marker::PhantomData,
                })
            }
            Err(holder) if holder == me => Err(MonitorError::Reentrancy { thread: me }),
            Err(holder) => Err(MonitorError::ConcurrentAccess {
                owner: holder,
                owner_stack: self.owner_stack.lock().clone(),
            }),
        }
    }

    /// Current holder token, if any
    #[inline]
    pub fn holder(&self) -> Option<u64> {
        match self.owner.load(Ordering::Relaxed) {
            IDLE => None,
            token => Some(token),
        }
    }

    fn release(&self) {
        // Stack slot goes first so a losing thread never pairs a stale stack
        // with a fresh owner.
        self.owner_stack.lock().take();
        self.owner.store(IDLE, Ordering::Release);
    }
}

impl Default for OwnerCell {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII release of an acquired [`OwnerCell`]
///
/// Dropping the token clears the sentinel. The token is deliberately not
/// `Send`: ownership belongs to the acquiring thread.
#[derive(Debug)]
pub struct OwnerToken<'a> {
    cell: &'a OwnerCell,
    _pinned: std::marker::PhantomData<*const ()>,
}

impl Drop for OwnerToken<'_> {
    fn drop(&mut self) {
        self.cell.release();
    }
}
