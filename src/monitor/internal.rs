/*!
 * Internal Diagnostic Sink
 * Where the engine and its clients log while the ownership guard is held
 *
 * Logging into the monitor from inside a dispatch callback would look
 * reentrant, so diagnostics about client misbehavior accumulate here and are
 * replayed into the real pipeline once the guard is released. The sink is a
 * plain mutex: it is written on the cold path only (bugs, quarantine,
 * force-closed groups), never per emitted line.
 */

use crate::data::LogData;
use crate::group::Conclusion;
use parking_lot::Mutex;

/// One deferred pipeline action
#[derive(Debug)]
pub(crate) enum InternalEntry {
    Line(LogData),
    OpenGroup(LogData),
    CloseGroup(Vec<Conclusion>),
}

/// Accumulator for deferred diagnostics
#[derive(Debug, Default)]
pub struct InternalSink {
    entries: Mutex<Vec<InternalEntry>>,
}

impl InternalSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic line
    pub fn push_line(&self, data: LogData) {
        self.entries.lock().push(InternalEntry::Line(data));
    }

    /// Append a diagnostic group open
    pub fn push_open_group(&self, data: LogData) {
        self.entries.lock().push(InternalEntry::OpenGroup(data));
    }

    /// Append the close of the most recent diagnostic group
    pub fn push_close_group(&self, conclusions: Vec<Conclusion>) {
        self.entries
            .lock()
            .push(InternalEntry::CloseGroup(conclusions));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Take every accumulated entry, leaving the sink empty
    pub(crate) fn drain(&self) -> Vec<InternalEntry> {
        std::mem::take(&mut *self.entries.lock())
    }
}
