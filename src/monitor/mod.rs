/*!
 * Monitor
 * Orchestrates the group stack, cascading filter resolution, client
 * dispatch, and the internal diagnostic replay
 *
 * Every mutating operation runs with exclusive logical ownership of the
 * monitor, modeled by a CAS sentinel rather than a lock: a reentrant call or
 * a concurrent caller gets an error, never a queue. That single invariant is
 * what lets the group stack and filter cascade stay non-atomic internally.
 */

mod internal;
mod token;

pub use internal::InternalSink;
pub use token::DependentToken;

pub(crate) use internal::InternalEntry;

use crate::core::errors::{ClientError, MonitorError};
use crate::core::static_log;
use crate::core::sync::OwnerCell;
use crate::core::types::{Depth, LogStamp, MonitorId, MonitorResult, SourceLocation};
use crate::data::{ErrorInfo, LogData};
use crate::filter::{self, LogFilter, LogLevel};
use crate::group::{Conclusion, ConclusionFn, GroupArena, GroupPoint};
use crate::output::{ChangeSignal, Client, DispatchFailure, GroupView, MonitorHandle, Output};
use crate::tag::TagSet;
use std::backtrace::Backtrace;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bounded replay passes before leftovers degrade to the static channel
const MAX_REPLAY_PASSES: usize = 4;

/// Well-known tags the engine attaches to the lines it generates itself
pub mod tags {
    use crate::tag::TagSet;
    use std::sync::OnceLock;

    macro_rules! well_known {
        ($(#[$doc:meta])* $name:ident, $text:literal) => {
            $(#[$doc])*
            pub fn $name() -> TagSet {
                static CELL: OnceLock<TagSet> = OnceLock::new();
                CELL.get_or_init(|| TagSet::parse($text)).clone()
            }
        };
    }

    well_known!(
        /// Replayed internal diagnostics
        internal, "m:Internal"
    );
    well_known!(
        /// Topic-change lines
        topic_changed, "m:Topic"
    );
    well_known!(
        /// Dependent-token creation lines
        token_creation, "m:CreateToken"
    );
    well_known!(
        /// Dependent-activity start groups
        activity_start, "m:StartActivity"
    );
    well_known!(
        /// When present in a monitor's auto-tags, concurrent-access errors
        /// carry the owner's captured call stack
        concurrent_access_stack, "m:ConcurrentAccessStackTrace"
    );
}

struct MonitorState {
    output: Output,
    arena: GroupArena,
    configured_filter: LogFilter,
    auto_tags: TagSet,
    topic: String,
    track_stack_trace: bool,
    last_stamp: LogStamp,
}

/// One logical activity monitor
///
/// A monitor is `Send + Sync` but admits exactly one logical caller at a
/// time: concurrent or reentrant mutation fails loudly (see
/// [`MonitorError`]). Any thread may *signal* state changes through the
/// [`MonitorHandle`] without owning the monitor.
pub struct Monitor {
    id: MonitorId,
    guard: OwnerCell,
    signal: Arc<ChangeSignal>,
    internal: Arc<InternalSink>,
    /// Auto-tags currently include the concurrent-access diagnostic tag
    capture_owner_stack: AtomicBool,
    state: UnsafeCell<MonitorState>,
}

// Safety: `state` is only reached behind the `guard` ownership sentinel,
// which admits exactly one thread at a time; `signal` and `internal` are
// thread-safe on their own.
unsafe impl Send for Monitor {}
unsafe impl Sync for Monitor {}

impl Monitor {
    pub fn new() -> Self {
        Self::with_topic("")
    }

    pub fn with_topic(topic: impl Into<String>) -> Self {
        Self {
            id: MonitorId::new_v4(),
            guard: OwnerCell::new(),
            signal: Arc::new(ChangeSignal::new()),
            internal: Arc::new(InternalSink::new()),
            capture_owner_stack: AtomicBool::new(false),
            state: UnsafeCell::new(MonitorState {
                output: Output::new(),
                arena: GroupArena::new(),
                configured_filter: LogFilter::UNDEFINED,
                auto_tags: TagSet::empty(),
                topic: topic.into(),
                track_stack_trace: false,
                last_stamp: LogStamp::MIN,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> MonitorId {
        self.id
    }

    /// Capability safe to hand to any thread: signaling and the internal sink
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            monitor_id: self.id,
            signal: Arc::clone(&self.signal),
            internal: Arc::clone(&self.internal),
        }
    }

    /// Run `op` with exclusive ownership, then replay internal diagnostics
    fn owned<R>(&self, op: impl FnOnce(&mut MonitorState) -> MonitorResult<R>) -> MonitorResult<R> {
        let token = self
            .guard
            .try_acquire(self.capture_owner_stack.load(Ordering::Relaxed))?;
        // Safety: the sentinel guarantees exclusive access until `token`
        // drops; no reference into `state` escapes `op`.
        let state = unsafe { &mut *self.state.get() };
        let result = op(state);
        drop(token);
        if !self.internal.is_empty() {
            self.replay_internal();
        }
        result
    }

    // --- lines ---

    /// Emit one line through the full cascade
    ///
    /// Returns whether the line passed the filters and was dispatched.
    pub fn log(&self, data: LogData) -> MonitorResult<bool> {
        self.owned(|state| Ok(self.emit_line(state, data)))
    }

    #[track_caller]
    pub fn debug(&self, text: impl Into<String>) -> MonitorResult<bool> {
        self.log(LogData::new(LogLevel::Debug, text))
    }

    #[track_caller]
    pub fn trace(&self, text: impl Into<String>) -> MonitorResult<bool> {
        self.log(LogData::new(LogLevel::Trace, text))
    }

    #[track_caller]
    pub fn info(&self, text: impl Into<String>) -> MonitorResult<bool> {
        self.log(LogData::new(LogLevel::Info, text))
    }

    #[track_caller]
    pub fn warn(&self, text: impl Into<String>) -> MonitorResult<bool> {
        self.log(LogData::new(LogLevel::Warn, text))
    }

    #[track_caller]
    pub fn error(&self, text: impl Into<String>) -> MonitorResult<bool> {
        self.log(LogData::new(LogLevel::Error, text))
    }

    #[track_caller]
    pub fn fatal(&self, text: impl Into<String>) -> MonitorResult<bool> {
        self.log(LogData::new(LogLevel::Fatal, text))
    }

    // --- groups ---

    /// Open a group; a filtered-out level yields a rejected frame
    ///
    /// Rejected frames occupy a stack slot and keep ancestry intact but
    /// carry no payload and notify no client.
    pub fn open_group(&self, data: LogData) -> MonitorResult<GroupPoint> {
        self.owned(|state| Ok(self.open_group_in(state, data, None)))
    }

    /// Open a group with a conclusion resolved when it closes
    pub fn open_group_with_conclusion(
        &self,
        data: LogData,
        conclusion: ConclusionFn,
    ) -> MonitorResult<GroupPoint> {
        self.owned(|state| Ok(self.open_group_in(state, data, Some(conclusion))))
    }

    /// Close down to and including the group behind `point`
    ///
    /// Inner groups still open are closed first. Closing an already-closed
    /// group is a no-op returning `false`.
    pub fn close_group(&self, point: GroupPoint) -> MonitorResult<bool> {
        self.owned(|state| Ok(self.close_group_in(state, point, Vec::new())))
    }

    /// Close the top group, if any
    pub fn close_top(&self) -> MonitorResult<bool> {
        self.owned(|state| Ok(self.close_top_in(state, Vec::new())))
    }

    /// Visible nesting depth (non-rejected open groups)
    pub fn depth(&self) -> MonitorResult<Depth> {
        self.owned(|state| Ok(state.arena.visible_depth()))
    }

    // --- topic, auto-tags, filters ---

    pub fn topic(&self) -> MonitorResult<String> {
        self.owned(|state| Ok(state.topic.clone()))
    }

    /// Change the topic, logging the change and notifying clients
    #[track_caller]
    pub fn set_topic(&self, topic: impl Into<String>) -> MonitorResult<()> {
        let origin = SourceLocation::caller();
        let topic = topic.into();
        self.owned(|state| {
            self.set_topic_in(state, topic, origin, false);
            Ok(())
        })
    }

    pub fn auto_tags(&self) -> MonitorResult<TagSet> {
        self.owned(|state| Ok(state.auto_tags.clone()))
    }

    /// Replace the tags automatically unioned into every line and group
    pub fn set_auto_tags(&self, tags: TagSet) -> MonitorResult<()> {
        self.owned(|state| {
            self.set_auto_tags_in(state, tags);
            Ok(())
        })
    }

    pub fn configured_filter(&self) -> MonitorResult<LogFilter> {
        self.owned(|state| Ok(state.configured_filter))
    }

    /// Set the monitor's own verbosity requirement
    pub fn set_configured_filter(&self, filter: LogFilter) -> MonitorResult<()> {
        self.owned(|state| {
            state.configured_filter = filter;
            Ok(())
        })
    }

    /// Configured filter combined with the aggregate client filter
    ///
    /// Consumes the change signal: a pending client-filter change is folded
    /// in before the value is returned.
    pub fn actual_filter(&self) -> MonitorResult<LogFilter> {
        self.owned(|state| Ok(self.actual_filter_in(state)))
    }

    pub fn track_stack_trace(&self) -> MonitorResult<bool> {
        self.owned(|state| Ok(state.track_stack_trace))
    }

    /// Capture call stacks on `Error`/`Fatal` lines
    pub fn set_track_stack_trace(&self, enabled: bool) -> MonitorResult<()> {
        self.owned(|state| {
            state.track_stack_trace = enabled;
            Ok(())
        })
    }

    // --- clients ---

    pub fn client_count(&self) -> MonitorResult<usize> {
        self.owned(|state| Ok(state.output.len()))
    }

    /// Register an observer; bound clients are wired up before they become
    /// visible, so a failure leaves no half-registered state
    ///
    /// Returns `false` when the client was already registered.
    pub fn register_client(&self, client: Arc<dyn Client>) -> MonitorResult<bool> {
        self.owned(|state| {
            let added = state
                .output
                .register(client, &self.handle())
                .map_err(|err| {
                    MonitorError::InvariantViolation(
                        format!("client rejected registration: {err}").into(),
                    )
                })?;
            if added {
                self.signal.set_dirty();
            }
            Ok(added)
        })
    }

    /// Remove an observer; returns `false` when it was not registered
    pub fn unregister_client(&self, client: &Arc<dyn Client>) -> MonitorResult<bool> {
        self.owned(|state| match state.output.unregister(client) {
            None => Ok(false),
            Some(owner_result) => {
                if let Err(err) = owner_result {
                    self.internal.push_line(
                        LogData::new(
                            LogLevel::Warn,
                            format!("client unregistration reported: {err}"),
                        )
                        .with_tags(tags::internal()),
                    );
                }
                self.signal.set_dirty();
                Ok(true)
            }
        })
    }

    /// Return an existing client satisfying `tester`, or register the
    /// factory's result
    ///
    /// The factory's result must itself satisfy the tester, else the call
    /// fails with an invariant violation. A `None` factory result yields
    /// `Ok(None)`.
    pub fn register_unique_client(
        &self,
        tester: impl Fn(&Arc<dyn Client>) -> bool,
        factory: impl FnOnce() -> Option<Arc<dyn Client>>,
    ) -> MonitorResult<Option<Arc<dyn Client>>> {
        self.owned(|state| {
            if let Some(existing) = state.output.find(&tester) {
                return Ok(Some(existing));
            }
            let Some(client) = factory() else {
                return Ok(None);
            };
            if !tester(&client) {
                return Err(MonitorError::InvariantViolation(
                    "factory result does not satisfy its tester".into(),
                ));
            }
            state
                .output
                .register(Arc::clone(&client), &self.handle())
                .map_err(|err| {
                    MonitorError::InvariantViolation(
                        format!("client rejected registration: {err}").into(),
                    )
                })?;
            self.signal.set_dirty();
            Ok(Some(client))
        })
    }

    // --- cascade internals (always called under the guard) ---

    fn actual_filter_in(&self, state: &mut MonitorState) -> LogFilter {
        if self.signal.take_dirty() {
            self.rescan_client_filter(state);
        }
        LogFilter::combine(state.configured_filter, self.signal.aggregate())
    }

    /// Recompute the aggregate client filter, dropping dead clients
    fn rescan_client_filter(&self, state: &mut MonitorState) {
        let mut aggregate = LogFilter::UNDEFINED;
        let mut dead: Vec<Arc<dyn Client>> = Vec::new();
        for client in state.output.clients() {
            if let Some(bound) = client.bound() {
                if bound.is_dead() {
                    dead.push(Arc::clone(client));
                    continue;
                }
                aggregate = LogFilter::combine(aggregate, bound.minimal_filter());
            }
        }
        self.signal.store_aggregate(aggregate);
        if !dead.is_empty() {
            let failures: Vec<DispatchFailure> = dead
                .into_iter()
                .map(|client| (client, ClientError::Dead))
                .collect();
            self.apply_quarantine(&mut state.output, failures);
        }
    }

    /// Apply the deferred-removal list collected during one dispatch pass
    fn apply_quarantine(&self, output: &mut Output, failures: Vec<DispatchFailure>) {
        for (client, err) in failures {
            output.remove(&client);
            if let Some(bound) = client.bound() {
                if let Err(second) = bound.set_owner(None, true) {
                    self.internal.push_line(
                        LogData::new(
                            LogLevel::Warn,
                            format!("forced unregistration failed: {second}"),
                        )
                        .with_tags(tags::internal()),
                    );
                }
            }
            self.internal.push_line(
                LogData::new(
                    LogLevel::Warn,
                    format!("Bug in client during dispatch: {err}. The client has been removed."),
                )
                .with_tags(tags::internal()),
            );
            self.signal.set_dirty();
        }
    }

    fn emit_line(&self, state: &mut MonitorState, mut data: LogData) -> bool {
        if data.is_rejected {
            return false;
        }
        if !state.auto_tags.is_empty() {
            data.tags = data.tags.union(&state.auto_tags);
        }
        if !data.is_filtered {
            let actual = self.actual_filter_in(state);
            let threshold = filter::resolve_line_threshold(&data.tags, actual.line);
            if !threshold.allows(data.level) {
                return false;
            }
        }
        if state.track_stack_trace && data.level >= LogLevel::Error {
            match data.error.as_mut() {
                Some(info) if info.backtrace.is_none() => {
                    info.backtrace = Some(Backtrace::force_capture().to_string());
                }
                None => {
                    data.error = Some(
                        ErrorInfo::new(data.level.name(), data.text.clone())
                            .with_backtrace(Backtrace::force_capture().to_string()),
                    );
                }
                _ => {}
            }
        }
        // Parallel relays may carry their own ordered stamp; everything else
        // is stamped here.
        let stamp = if data.is_parallel && data.stamp != LogStamp::MIN {
            data.stamp
        } else {
            LogStamp::next_unique(state.last_stamp)
        };
        if stamp > state.last_stamp {
            state.last_stamp = stamp;
        }
        let depth = state.arena.visible_depth();
        data.seal(self.id, stamp, depth);

        let failures = state.output.dispatch_log(&data);
        self.apply_quarantine(&mut state.output, failures);
        true
    }

    fn open_group_in(
        &self,
        state: &mut MonitorState,
        mut data: LogData,
        conclusion: Option<ConclusionFn>,
    ) -> GroupPoint {
        if !state.auto_tags.is_empty() {
            data.tags = data.tags.union(&state.auto_tags);
        }
        let rejected = data.is_rejected
            || (!data.is_filtered && {
                let actual = self.actual_filter_in(state);
                let threshold = filter::resolve_group_threshold(&data.tags, actual.group);
                !threshold.allows(data.level)
            });
        if rejected {
            return state.arena.open_frame(true).point();
        }

        let saved_filter = state.configured_filter;
        let saved_tags = state.auto_tags.clone();
        let saved_stack = state.track_stack_trace;
        if data.level >= LogLevel::Error {
            // Capture full detail for the scope of an error group.
            state.configured_filter = LogFilter::DEBUG;
        }

        let stamp = LogStamp::next_unique(state.last_stamp);
        state.last_stamp = stamp;

        let MonitorState { arena, output, .. } = &mut *state;
        let point = {
            let frame = arena.open_frame(false);
            data.seal(self.id, stamp, frame.depth());
            frame.saved_filter = saved_filter;
            frame.saved_tags = saved_tags;
            frame.saved_stack_trace = saved_stack;
            frame.conclusion = conclusion;
            frame.data = Some(data);
            frame.point()
        };

        let failures = match arena.top().and_then(|top| {
            top.data().map(|data| GroupView {
                data,
                depth: top.depth(),
            })
        }) {
            Some(view) => output.dispatch_open_group(&view),
            None => Vec::new(),
        };
        self.apply_quarantine(output, failures);
        point
    }

    fn close_group_in(
        &self,
        state: &mut MonitorState,
        point: GroupPoint,
        extra: Vec<Conclusion>,
    ) -> bool {
        let Some(target) = state.arena.resolve(point) else {
            return false;
        };
        // The caller closed an outer group before inner ones: close down to
        // the target first.
        while state.arena.top_index().is_some_and(|top| top > target) {
            self.close_top_in(state, Vec::new());
        }
        self.close_top_in(state, extra)
    }

    fn close_top_in(&self, state: &mut MonitorState, mut extra: Vec<Conclusion>) -> bool {
        let Some(top_rejected) = state.arena.top().map(|frame| frame.is_rejected()) else {
            return false;
        };
        if top_rejected {
            // Rejected frames were never announced; they close silently. A
            // dependent-activity frame still restores the adopted topic.
            let saved_topic = state
                .arena
                .top_mut()
                .and_then(|frame| frame.saved_topic.take());
            state.arena.pop();
            if let Some(previous) = saved_topic {
                self.set_topic_in(state, previous, SourceLocation::UNKNOWN, true);
            }
            return true;
        }

        let mut conclusions = Vec::new();
        let conclusion_fn = state.arena.top_mut().and_then(|frame| frame.conclusion.take());
        if let Some(resolve) = conclusion_fn {
            match resolve() {
                Ok(text) if !text.trim().is_empty() => {
                    conclusions.push(Conclusion::new(TagSet::empty(), text));
                }
                Ok(_) => {}
                Err(err) => {
                    conclusions.push(Conclusion::new(
                        tags::internal(),
                        format!("conclusion callback failed: {err}"),
                    ));
                }
            }
        }
        conclusions.append(&mut extra);

        {
            let MonitorState { arena, output, .. } = &mut *state;
            let view = arena.top().and_then(|top| {
                top.data().map(|data| GroupView {
                    data,
                    depth: top.depth(),
                })
            });
            if let Some(view) = view {
                let mut failures = output.dispatch_group_closing(&view, &mut conclusions);
                failures.extend(output.dispatch_group_closed(&view, &conclusions));
                self.apply_quarantine(output, failures);
            }
        }

        // Restore what the open snapshotted, then recycle the slot.
        let (saved_filter, saved_tags, saved_stack, saved_topic) = match state.arena.top_mut() {
            Some(frame) => (
                frame.saved_filter,
                frame.saved_tags.clone(),
                frame.saved_stack_trace,
                frame.saved_topic.take(),
            ),
            None => return false,
        };
        state.configured_filter = saved_filter;
        state.auto_tags = saved_tags;
        state.track_stack_trace = saved_stack;
        self.refresh_capture_flag(state);
        state.arena.pop();

        if let Some(previous) = saved_topic {
            self.set_topic_in(state, previous, SourceLocation::UNKNOWN, true);
        }
        true
    }

    fn set_topic_in(
        &self,
        state: &mut MonitorState,
        topic: String,
        origin: SourceLocation,
        restoration: bool,
    ) {
        if state.topic == topic {
            return;
        }
        state.topic = topic;
        let text = if restoration {
            format!("Restored topic '{}'.", state.topic)
        } else {
            format!("Topic: {}", state.topic)
        };
        let mut line = LogData::new(LogLevel::Info, text)
            .with_tags(tags::topic_changed())
            .filtered();
        line.origin = origin;
        self.emit_line(state, line);

        let topic_text = state.topic.clone();
        let failures = state.output.dispatch_topic_changed(&topic_text, origin);
        self.apply_quarantine(&mut state.output, failures);
    }

    fn set_auto_tags_in(&self, state: &mut MonitorState, tags: TagSet) {
        if state.auto_tags == tags {
            return;
        }
        state.auto_tags = tags;
        self.refresh_capture_flag(state);
        let current = state.auto_tags.clone();
        let failures = state.output.dispatch_auto_tags_changed(&current);
        self.apply_quarantine(&mut state.output, failures);
    }

    fn refresh_capture_flag(&self, state: &MonitorState) {
        self.capture_owner_stack.store(
            state.auto_tags.overlaps(&tags::concurrent_access_stack()),
            Ordering::Relaxed,
        );
    }

    // --- internal replay ---

    /// Replay diagnostics accumulated while the guard was held
    ///
    /// Runs after release so the replay itself is not reentrant. Leftovers
    /// after the bounded passes (contention, or a client that keeps filling
    /// the sink from its callbacks) degrade to the static channel.
    fn replay_internal(&self) {
        for _ in 0..MAX_REPLAY_PASSES {
            if self.internal.is_empty() {
                return;
            }
            let Ok(token) = self.guard.try_acquire(false) else {
                // Another thread owns the monitor by now; its own release
                // will pick the entries up.
                return;
            };
            let entries = self.internal.drain();
            // Safety: same exclusivity argument as `owned`.
            let state = unsafe { &mut *self.state.get() };
            self.replay_entries(state, entries);
            drop(token);
        }
        for entry in self.internal.drain() {
            match entry {
                InternalEntry::Line(data) | InternalEntry::OpenGroup(data) => {
                    static_log::log(data.level, data.text);
                }
                InternalEntry::CloseGroup(_) => {}
            }
        }
    }

    fn replay_entries(&self, state: &mut MonitorState, entries: Vec<InternalEntry>) {
        let mut opened: Vec<GroupPoint> = Vec::new();
        for entry in entries {
            match entry {
                InternalEntry::Line(mut data) => {
                    data.tags = data.tags.union(&tags::internal());
                    data.is_filtered = true;
                    self.emit_line(state, data);
                }
                InternalEntry::OpenGroup(mut data) => {
                    data.tags = data.tags.union(&tags::internal());
                    data.is_filtered = true;
                    opened.push(self.open_group_in(state, data, None));
                }
                InternalEntry::CloseGroup(conclusions) => {
                    if let Some(point) = opened.pop() {
                        self.close_group_in(state, point, conclusions);
                    }
                }
            }
        }
        // Force-close groups the diagnostics left open.
        while let Some(point) = opened.pop() {
            if state.arena.resolve(point).is_some() {
                self.close_group_in(
                    state,
                    point,
                    vec![Conclusion::new(
                        tags::internal(),
                        "error while replaying internal diagnostics",
                    )],
                );
            }
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
