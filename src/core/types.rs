/*!
 * Core Types
 * Common types used across the engine
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use super::errors::StampParseError;

/// Monitor identity type
pub type MonitorId = uuid::Uuid;

/// Group nesting depth (non-rejected frames only)
pub type Depth = u16;

/// Common result type for monitor operations
pub type MonitorResult<T> = Result<T, super::errors::MonitorError>;

/// Canonical stamp format: 100ns resolution, no offset (stamps are UTC)
const STAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:7]"
);

/// Source position captured at the emitting call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    /// Placeholder for relayed payloads whose origin was not captured
    pub const UNKNOWN: Self = Self {
        file: "<unknown>",
        line: 0,
    };

    /// Capture the caller's position
    #[inline]
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Strictly monotonic per-monitor timestamp
///
/// Wall-clock time truncated to 100ns resolution plus a uniquifier that
/// disambiguates stamps generated in the same tick. Collisions are resolved
/// by bumping the uniquifier, never by re-reading the clock.
///
/// The canonical text form round-trips exactly:
/// `2026-08-06 14:03:02.1234500` or, when the uniquifier is non-zero,
/// `2026-08-06 14:03:02.1234500(3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogStamp {
    /// UTC instant, truncated to 100ns
    pub at: OffsetDateTime,
    /// Same-tick disambiguator
    pub uniq: u16,
}

impl LogStamp {
    /// Earliest representable stamp, used to seed per-monitor generators
    pub const MIN: Self = Self {
        at: OffsetDateTime::UNIX_EPOCH,
        uniq: 0,
    };

    /// Current wall-clock stamp with a zero uniquifier
    #[inline]
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        let nanos = now.nanosecond();
        // Truncation keeps the text form lossless (7 subsecond digits).
        let at = now
            .replace_nanosecond(nanos - nanos % 100)
            .unwrap_or(now);
        Self { at, uniq: 0 }
    }

    /// Next stamp strictly greater than `last`
    ///
    /// Same-tick stamps reuse the instant and bump the uniquifier; an
    /// exhausted uniquifier advances the instant by one 100ns tick.
    pub fn next_unique(last: Self) -> Self {
        let now = Self::now();
        if now.at > last.at {
            now
        } else if last.uniq < u16::MAX {
            Self {
                at: last.at,
                uniq: last.uniq + 1,
            }
        } else {
            Self {
                at: last.at + Duration::nanoseconds(100),
                uniq: 0,
            }
        }
    }

    /// Parse the canonical text form
    pub fn parse(text: &str) -> Result<Self, StampParseError> {
        let (instant, uniq) = match text.strip_suffix(')') {
            Some(prefix) => {
                let open = prefix
                    .rfind('(')
                    .ok_or_else(|| StampParseError(text.into()))?;
                let uniq = prefix[open + 1..]
                    .parse::<u16>()
                    .map_err(|_| StampParseError(text.into()))?;
                (&prefix[..open], uniq)
            }
            None => (text, 0),
        };
        let at = PrimitiveDateTime::parse(instant, STAMP_FORMAT)
            .map_err(|_| StampParseError(text.into()))?
            .assume_utc();
        Ok(Self { at, uniq })
    }
}

impl fmt::Display for LogStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.at.format(STAMP_FORMAT).map_err(|_| fmt::Error)?;
        if self.uniq == 0 {
            write!(f, "{text}")
        } else {
            write!(f, "{text}({})", self.uniq)
        }
    }
}
