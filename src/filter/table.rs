/*!
 * Tag Filter Table
 * Process-wide, ordered tag → clamper rules and the default filter
 *
 * Both the rule table and the default filter are immutable snapshots behind
 * an atomic swap: configuration replaces them wholesale, readers on the log
 * hot path never observe a partial update and never take a lock.
 */

use crate::core::sync::SnapshotCell;
use crate::filter::{LevelFilter, LogFilter};
use crate::tag::TagSet;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

/// Filter applied when a rule's tag set overlaps a payload's tags
///
/// A hard clamper fixes the effective threshold regardless of what the
/// monitor/client cascade decided; a soft clamper only lowers it (more
/// verbose), never raises it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagClamper {
    pub filter: LogFilter,
    pub is_hard: bool,
}

impl TagClamper {
    #[inline]
    pub const fn hard(filter: LogFilter) -> Self {
        Self {
            filter,
            is_hard: true,
        }
    }

    #[inline]
    pub const fn soft(filter: LogFilter) -> Self {
        Self {
            filter,
            is_hard: false,
        }
    }
}

/// One ordered rule: tag-set → clamper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilterRule {
    pub tags: TagSet,
    pub clamper: TagClamper,
}

impl TagFilterRule {
    pub fn new(tags: TagSet, clamper: TagClamper) -> Self {
        Self { tags, clamper }
    }
}

/// Fallback for undefined default-filter components
const DEFAULT_FALLBACK: LogFilter = LogFilter::TRACE;

fn table_cell() -> &'static SnapshotCell<Vec<TagFilterRule>> {
    static TABLE: OnceLock<SnapshotCell<Vec<TagFilterRule>>> = OnceLock::new();
    TABLE.get_or_init(|| SnapshotCell::new(Vec::new()))
}

fn default_cell() -> &'static SnapshotCell<LogFilter> {
    static DEFAULT: OnceLock<SnapshotCell<LogFilter>> = OnceLock::new();
    DEFAULT.get_or_init(|| SnapshotCell::new(DEFAULT_FALLBACK))
}

/// Install the rule table wholesale (replaces any previous rules)
pub fn install_tag_filters(rules: Vec<TagFilterRule>) {
    table_cell().set(rules);
}

/// Remove every rule
pub fn clear_tag_filters() {
    table_cell().set(Vec::new());
}

/// Current rule snapshot
pub fn tag_filters() -> Arc<Vec<TagFilterRule>> {
    table_cell().get()
}

/// Replace the process-wide default filter
///
/// Undefined components are resolved against `Trace` so the default itself
/// always stays fully defined.
pub fn set_default_filter(filter: LogFilter) {
    default_cell().set(filter.resolve(DEFAULT_FALLBACK));
}

/// Current process-wide default filter (always fully defined)
#[inline]
pub fn default_filter() -> LogFilter {
    *default_cell().get()
}

/// Resolve the effective line threshold for `tags`
///
/// `cascade` is what the monitor/client cascade decided (possibly
/// `Undefined`). First matching rule wins: a hard clamper fixes the
/// threshold, a soft one combines in (most verbose wins). No match falls
/// back to the cascade resolved against the default filter.
#[inline]
pub fn resolve_line_threshold(tags: &TagSet, cascade: LevelFilter) -> LevelFilter {
    resolve_threshold(tags, cascade, |filter| filter.line)
}

/// Resolve the effective group threshold for `tags`
#[inline]
pub fn resolve_group_threshold(tags: &TagSet, cascade: LevelFilter) -> LevelFilter {
    resolve_threshold(tags, cascade, |filter| filter.group)
}

fn resolve_threshold(
    tags: &TagSet,
    cascade: LevelFilter,
    component: fn(&LogFilter) -> LevelFilter,
) -> LevelFilter {
    let default = component(&default_filter());
    let resolved = cascade.resolve(default);
    if !tags.is_empty() {
        for rule in table_cell().get().iter() {
            if rule.tags.overlaps(tags) {
                let clamp = component(&rule.clamper.filter);
                return if rule.clamper.is_hard {
                    clamp.resolve(default)
                } else {
                    LevelFilter::combine(resolved, clamp)
                };
            }
        }
    }
    resolved
}
