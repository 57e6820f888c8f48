/*!
 * Verbosity Filters
 * Levels, thresholds, and the most-verbose-wins combine algebra
 */

mod table;

pub use table::{
    clear_tag_filters, default_filter, install_tag_filters, resolve_group_threshold,
    resolve_line_threshold, set_default_filter, tag_filters, TagClamper, TagFilterRule,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of one emitted line or group, ordered ascending
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 1,
    Trace = 2,
    Info = 3,
    Warn = 4,
    Error = 5,
    Fatal = 6,
}

impl LogLevel {
    /// Name used in canonical text forms
    pub const fn name(self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Trace => "Trace",
            Self::Info => "Info",
            Self::Warn => "Warn",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verbosity threshold for one dimension (lines or groups)
///
/// `Undefined` defers to the process-wide default; `Off` suppresses
/// everything, including `Fatal`. The numeric representation orders
/// thresholds from most verbose (`Debug`) to most restrictive (`Off`), with
/// `Undefined` outside that scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LevelFilter {
    Undefined = 0,
    Debug = 1,
    Trace = 2,
    Info = 3,
    Warn = 4,
    Error = 5,
    Fatal = 6,
    Off = 7,
}

impl LevelFilter {
    /// Per-component combine: most verbose wins, `Undefined` never wins
    #[inline]
    pub const fn combine(a: Self, b: Self) -> Self {
        match (a, b) {
            (Self::Undefined, other) | (other, Self::Undefined) => other,
            _ => {
                if a as u8 <= b as u8 {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// Replace `Undefined` with `default`
    #[inline]
    pub const fn resolve(self, default: Self) -> Self {
        match self {
            Self::Undefined => default,
            defined => defined,
        }
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether a line/group of `level` passes this threshold
    ///
    /// Callers resolve `Undefined` first; an unresolved threshold lets
    /// everything through.
    #[inline]
    pub const fn allows(self, level: LogLevel) -> bool {
        match self {
            Self::Off => false,
            Self::Undefined => true,
            _ => level as u8 >= self as u8,
        }
    }

    /// Packed representation for atomic storage
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8)
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Debug,
            2 => Self::Trace,
            3 => Self::Info,
            4 => Self::Warn,
            5 => Self::Error,
            6 => Self::Fatal,
            7 => Self::Off,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "Undefined",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
            Self::Info => "Info",
            Self::Warn => "Warn",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
            Self::Off => "Off",
        };
        f.write_str(name)
    }
}

impl From<LogLevel> for LevelFilter {
    #[inline]
    fn from(level: LogLevel) -> Self {
        Self::from_u8(level as u8)
    }
}

/// Two independent verbosity thresholds: one for lines, one for groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogFilter {
    pub line: LevelFilter,
    pub group: LevelFilter,
}

impl LogFilter {
    /// Defers both dimensions to the process default
    pub const UNDEFINED: Self = Self::new(LevelFilter::Undefined, LevelFilter::Undefined);
    /// Everything, both dimensions
    pub const DEBUG: Self = Self::new(LevelFilter::Debug, LevelFilter::Debug);
    /// Trace and above, both dimensions
    pub const TRACE: Self = Self::new(LevelFilter::Trace, LevelFilter::Trace);
    /// All groups from Trace, lines from Info
    pub const VERBOSE: Self = Self::new(LevelFilter::Info, LevelFilter::Trace);
    /// Groups from Info, lines from Warn
    pub const TERSE: Self = Self::new(LevelFilter::Warn, LevelFilter::Info);
    /// Errors only, both dimensions
    pub const RELEASE: Self = Self::new(LevelFilter::Error, LevelFilter::Error);
    /// Nothing at all
    pub const OFF: Self = Self::new(LevelFilter::Off, LevelFilter::Off);

    #[inline]
    pub const fn new(line: LevelFilter, group: LevelFilter) -> Self {
        Self { line, group }
    }

    /// Component-wise combine: most verbose wins, `Undefined` never wins
    #[inline]
    pub const fn combine(a: Self, b: Self) -> Self {
        Self {
            line: LevelFilter::combine(a.line, b.line),
            group: LevelFilter::combine(a.group, b.group),
        }
    }

    /// Replace `Undefined` components from `default`
    #[inline]
    pub const fn resolve(self, default: Self) -> Self {
        Self {
            line: self.line.resolve(default.line),
            group: self.group.resolve(default.group),
        }
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.line.is_undefined() && self.group.is_undefined()
    }

    /// Packed representation for atomic storage (line in the high byte)
    #[inline]
    pub const fn as_u16(self) -> u16 {
        ((self.line as u16) << 8) | self.group as u16
    }

    /// Inverse of [`as_u16`](Self::as_u16)
    #[inline]
    pub const fn from_u16(value: u16) -> Self {
        Self {
            line: LevelFilter::from_u8((value >> 8) as u8),
            group: LevelFilter::from_u8((value & 0xff) as u8),
        }
    }
}

impl Default for LogFilter {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Display for LogFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNDEFINED => f.write_str("Undefined"),
            Self::DEBUG => f.write_str("Debug"),
            Self::TRACE => f.write_str("Trace"),
            Self::VERBOSE => f.write_str("Verbose"),
            Self::TERSE => f.write_str("Terse"),
            Self::RELEASE => f.write_str("Release"),
            Self::OFF => f.write_str("Off"),
            other => write!(f, "{{Group={}, Line={}}}", other.group, other.line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_passes_threshold_by_severity() {
        assert!(LevelFilter::Warn.allows(LogLevel::Warn));
        assert!(LevelFilter::Warn.allows(LogLevel::Fatal));
        assert!(!LevelFilter::Warn.allows(LogLevel::Info));
        assert!(LevelFilter::Debug.allows(LogLevel::Debug));
        assert!(!LevelFilter::Off.allows(LogLevel::Fatal));
    }

    #[test]
    fn test_combine_most_verbose_wins() {
        assert_eq!(
            LevelFilter::combine(LevelFilter::Debug, LevelFilter::Warn),
            LevelFilter::Debug
        );
        assert_eq!(
            LevelFilter::combine(LevelFilter::Off, LevelFilter::Warn),
            LevelFilter::Warn
        );
    }

    #[test]
    fn test_combine_undefined_never_wins() {
        assert_eq!(
            LevelFilter::combine(LevelFilter::Undefined, LevelFilter::Error),
            LevelFilter::Error
        );
        assert_eq!(
            LevelFilter::combine(LevelFilter::Error, LevelFilter::Undefined),
            LevelFilter::Error
        );
        assert_eq!(
            LevelFilter::combine(LevelFilter::Undefined, LevelFilter::Undefined),
            LevelFilter::Undefined
        );
    }

    #[test]
    fn test_filter_resolve() {
        let partial = LogFilter::new(LevelFilter::Undefined, LevelFilter::Error);
        let resolved = partial.resolve(LogFilter::TRACE);
        assert_eq!(resolved.line, LevelFilter::Trace);
        assert_eq!(resolved.group, LevelFilter::Error);
    }

    #[test]
    fn test_filter_pack_round_trip() {
        for filter in [
            LogFilter::UNDEFINED,
            LogFilter::DEBUG,
            LogFilter::VERBOSE,
            LogFilter::RELEASE,
            LogFilter::OFF,
            LogFilter::new(LevelFilter::Fatal, LevelFilter::Trace),
        ] {
            assert_eq!(LogFilter::from_u16(filter.as_u16()), filter);
        }
    }

    #[test]
    fn test_filter_display_names() {
        assert_eq!(LogFilter::RELEASE.to_string(), "Release");
        assert_eq!(
            LogFilter::new(LevelFilter::Fatal, LevelFilter::Trace).to_string(),
            "{Group=Trace, Line=Fatal}"
        );
    }
}
