/*!
 * Log Payloads
 * The immutable-after-construction payload of one line or one group header
 */

mod pool;

pub use pool::{LogDataPool, PoolConfig, PoolStats, PooledLogData};

use crate::core::data_structures::InlineString;
use crate::core::types::{Depth, LogStamp, MonitorId, SourceLocation};
use crate::filter::LogLevel;
use crate::tag::TagSet;
use serde::Serialize;
use std::error::Error;

/// Sentinel replacing empty or whitespace-only text
pub const NO_LOG_TEXT: &str = "<no-log>";

/// Captured failure attached to a line or group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Short classifier, e.g. an error type or code
    pub kind: InlineString,
    /// Full message, source chain joined with ` -> `
    pub message: String,
    /// Call stack, captured when the monitor's stack-trace flag is set
    pub backtrace: Option<String>,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<InlineString>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            backtrace: None,
        }
    }

    /// Capture an error and its source chain
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(" -> ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new("error", message)
    }

    pub fn with_backtrace(mut self, backtrace: String) -> Self {
        self.backtrace = Some(backtrace);
        self
    }
}

/// Payload of one log line or one group header
///
/// Created once per emitted line/group and immutable afterwards, except for
/// the two trusted relay mutators ([`set_explicit_stamp`] and
/// [`set_explicit_tags`]). Monitors fill identity, stamp and depth at
/// emission; constructors only capture what the call site knows.
///
/// [`set_explicit_stamp`]: Self::set_explicit_stamp
/// [`set_explicit_tags`]: Self::set_explicit_tags
#[derive(Debug, Clone, Serialize)]
pub struct LogData {
    /// Emitting monitor, nil until sealed
    pub monitor_id: MonitorId,
    /// Strictly monotonic per monitor
    pub stamp: LogStamp,
    /// Nesting depth at emission (non-rejected frames only)
    pub depth: Depth,
    pub level: LogLevel,
    pub tags: TagSet,
    /// Never empty; empty input is replaced by [`NO_LOG_TEXT`]
    pub text: String,
    pub error: Option<ErrorInfo>,
    pub origin: SourceLocation,
    /// Filter decision already taken by a trusted upstream relay
    pub is_filtered: bool,
    /// Captured by a parallel logging path, stamped out of band
    pub is_parallel: bool,
    /// Already rejected upstream; dropped on arrival
    pub is_rejected: bool,
}

impl LogData {
    /// Create a payload for `level` with `text`, capturing the call site
    #[track_caller]
    pub fn new(level: LogLevel, text: impl Into<String>) -> Self {
        let text = text.into();
        let text = if text.trim().is_empty() {
            NO_LOG_TEXT.to_owned()
        } else {
            text
        };
        Self {
            monitor_id: MonitorId::nil(),
            stamp: LogStamp::MIN,
            depth: 0,
            level,
            tags: TagSet::empty(),
            text,
            error: None,
            origin: SourceLocation::caller(),
            is_filtered: false,
            is_parallel: false,
            is_rejected: false,
        }
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_error(mut self, err: &(dyn Error + 'static)) -> Self {
        self.error = Some(ErrorInfo::from_error(err));
        self
    }

    pub fn with_error_info(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Mark the filter decision as already taken upstream
    pub fn filtered(mut self) -> Self {
        self.is_filtered = true;
        self
    }

    /// Mark as captured by a parallel logging path
    pub fn parallel(mut self) -> Self {
        self.is_parallel = true;
        self
    }

    /// Fill monitor identity, stamp, and depth at emission
    pub(crate) fn seal(&mut self, monitor_id: MonitorId, stamp: LogStamp, depth: Depth) {
        self.monitor_id = monitor_id;
        self.stamp = stamp;
        self.depth = depth;
    }

    /// Trusted relay mutator: replace the stamp of a pre-stamped payload
    ///
    /// Only pre-filtering relays that already own a correctly ordered stamp
    /// may call this; everyone else lets the monitor stamp at emission.
    pub fn set_explicit_stamp(&mut self, stamp: LogStamp) {
        self.stamp = stamp;
    }

    /// Trusted relay mutator: replace the tags of a relayed payload
    pub fn set_explicit_tags(&mut self, tags: TagSet) {
        self.tags = tags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::MonitorError;

    #[test]
    fn test_empty_text_replaced_by_sentinel() {
        assert_eq!(LogData::new(LogLevel::Info, "").text, NO_LOG_TEXT);
        assert_eq!(LogData::new(LogLevel::Info, "   ").text, NO_LOG_TEXT);
        assert_eq!(LogData::new(LogLevel::Info, "real").text, "real");
    }

    #[test]
    fn test_new_captures_call_site() {
        let data = LogData::new(LogLevel::Warn, "w");
        assert!(data.origin.file.ends_with("mod.rs"));
        assert!(data.monitor_id.is_nil());
        assert_eq!(data.depth, 0);
    }

    #[test]
    fn test_error_info_joins_source_chain() {
        let inner = MonitorError::Reentrancy { thread: 3 };
        let outer = crate::core::errors::ClientError::Monitor(inner);
        let info = ErrorInfo::from_error(&outer);
        assert!(info.message.contains("reentrant"));
    }

    #[test]
    fn test_builders() {
        let data = LogData::new(LogLevel::Error, "boom")
            .with_tags(TagSet::parse("net"))
            .with_error_info(ErrorInfo::new("io", "connection reset"))
            .filtered();
        assert!(data.is_filtered);
        assert!(data.tags.contains("net"));
        assert_eq!(data.error.as_ref().map(|e| e.kind.as_str()), Some("io"));
    }
}
