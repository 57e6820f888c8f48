/*!
 * Clients
 * Polymorphic observers and the bound-client capability
 */

use crate::core::errors::ClientError;
use crate::core::types::{Depth, MonitorId, SourceLocation};
use crate::data::LogData;
use crate::filter::LogFilter;
use crate::group::Conclusion;
use crate::monitor::InternalSink;
use crate::tag::TagSet;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

/// What a client sees of one group
#[derive(Debug, Clone, Copy)]
pub struct GroupView<'a> {
    pub data: &'a LogData,
    pub depth: Depth,
}

/// Observer of one monitor's activity
///
/// Callbacks run in registration order, inside the monitor's ownership
/// guard. They must be side-effect-light and must not log back into the same
/// monitor synchronously (that is reentrancy) — diagnostics go through the
/// internal sink on the [`MonitorHandle`] instead. Returning an `Err`
/// quarantines the client: it is removed after the current dispatch pass and
/// the failure never reaches the emitting caller.
pub trait Client: Send + Sync {
    fn on_unfiltered_log(&self, data: &LogData) -> Result<(), ClientError> {
        let _ = data;
        Ok(())
    }

    fn on_open_group(&self, group: &GroupView<'_>) -> Result<(), ClientError> {
        let _ = group;
        Ok(())
    }

    /// Clients may append conclusions of their own
    fn on_group_closing(
        &self,
        group: &GroupView<'_>,
        conclusions: &mut Vec<Conclusion>,
    ) -> Result<(), ClientError> {
        let _ = (group, conclusions);
        Ok(())
    }

    fn on_group_closed(
        &self,
        group: &GroupView<'_>,
        conclusions: &[Conclusion],
    ) -> Result<(), ClientError> {
        let _ = (group, conclusions);
        Ok(())
    }

    fn on_topic_changed(&self, topic: &str, origin: SourceLocation) -> Result<(), ClientError> {
        let _ = (topic, origin);
        Ok(())
    }

    fn on_auto_tags_changed(&self, tags: &TagSet) -> Result<(), ClientError> {
        let _ = tags;
        Ok(())
    }

    /// Bound-client capability, if this client carries one
    fn bound(&self) -> Option<&dyn BoundClient> {
        None
    }
}

/// Optional capability: a client that participates in the filter cascade
///
/// Bound clients contribute a minimal verbosity requirement and a liveness
/// flag, and receive a [`MonitorHandle`] at registration through which they
/// signal changes from any thread.
pub trait BoundClient: Client {
    /// Least verbosity this client requires from its monitor
    fn minimal_filter(&self) -> LogFilter;

    /// A dead client is dropped from the cascade and removed
    fn is_dead(&self) -> bool {
        false
    }

    /// Called before registration (`Some`) and at removal (`None`)
    ///
    /// An `Err` at registration aborts it with no half-registered state; an
    /// `Err` at forced removal is logged, never propagated.
    fn set_owner(&self, owner: Option<MonitorHandle>, force: bool) -> Result<(), ClientError>;
}

/// Lock-free change signal shared between a monitor and its bound clients
///
/// `set_dirty` may be called from any thread at any time; the owning monitor
/// consumes the flag on its next operation and rescans. The packed aggregate
/// word carries the combined client filter so the fast path can fold an
/// uncontested change without a rescan.
#[derive(Debug)]
pub struct ChangeSignal {
    dirty: AtomicBool,
    aggregate: AtomicU16,
}

impl ChangeSignal {
    pub(crate) fn new() -> Self {
        Self {
            dirty: AtomicBool::new(false),
            aggregate: AtomicU16::new(LogFilter::UNDEFINED.as_u16()),
        }
    }

    /// Request a client-filter rescan (safe from any thread, no lock)
    #[inline]
    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub(crate) fn aggregate(&self) -> LogFilter {
        LogFilter::from_u16(self.aggregate.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store_aggregate(&self, filter: LogFilter) {
        self.aggregate.store(filter.as_u16(), Ordering::Release);
    }

    /// Fast path for a direct minimal-filter change
    ///
    /// If the old value cannot have constrained the current aggregate, the
    /// new value folds in with one CAS; otherwise a full rescan is forced
    /// through the dirty flag.
    pub fn fold_filter_change(&self, old: LogFilter, new: LogFilter) {
        loop {
            let current = self.aggregate();
            let old_could_bind = (!old.line.is_undefined() && old.line == current.line)
                || (!old.group.is_undefined() && old.group == current.group);
            if old_could_bind {
                self.set_dirty();
                return;
            }
            let folded = LogFilter::combine(current, new);
            if folded == current {
                return;
            }
            if self
                .aggregate
                .compare_exchange(
                    current.as_u16(),
                    folded.as_u16(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
        }
    }
}

/// Capability handed to bound clients at registration
///
/// Cheap to clone; every method is safe from any thread. The handle never
/// reaches into monitor state: it only touches the change signal and the
/// internal diagnostic sink.
#[derive(Clone)]
pub struct MonitorHandle {
    pub(crate) monitor_id: MonitorId,
    pub(crate) signal: Arc<ChangeSignal>,
    pub(crate) internal: Arc<InternalSink>,
}

impl MonitorHandle {
    #[inline]
    pub fn monitor_id(&self) -> MonitorId {
        self.monitor_id
    }

    /// Flag the monitor's client filter as stale
    #[inline]
    pub fn signal_change(&self) {
        self.signal.set_dirty();
    }

    /// Fast path for a direct minimal-filter property change
    #[inline]
    pub fn on_minimal_filter_changed(&self, old: LogFilter, new: LogFilter) {
        self.signal.fold_filter_change(old, new);
    }

    /// Diagnostic sink replayed into the pipeline after guard release
    #[inline]
    pub fn internal(&self) -> &InternalSink {
        &self.internal
    }
}
