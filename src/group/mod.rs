/*!
 * Group Stack
 * Recycled frame arena with save/restore bookkeeping
 *
 * Frames are pre-allocated and reused: the arena is a vector of frame slots
 * grown by doubling, indexed by stack position, reinitialized on each open.
 * A frame's identity survives across many open/close cycles; a generation
 * counter makes stale handles harmless. Rejected groups occupy a slot and
 * stay linked into the parent chain (the slot below them) but carry no
 * payload and contribute no visible depth.
 */

use crate::core::types::Depth;
use crate::data::LogData;
use crate::filter::LogFilter;
use crate::tag::TagSet;
use serde::Serialize;
use std::error::Error;

/// Initial arena size; doubles when exhausted
const INITIAL_FRAMES: usize = 8;

/// Conclusion appended while a group closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conclusion {
    pub tag: TagSet,
    pub text: String,
}

impl Conclusion {
    pub fn new(tag: TagSet, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

/// User conclusion callback, resolved when its group closes
///
/// A failing callback is converted into a diagnostic conclusion, never
/// propagated.
pub type ConclusionFn =
    Box<dyn FnOnce() -> Result<String, Box<dyn Error + Send + Sync>> + Send>;

/// Copyable handle to one opened group
///
/// Closing through a stale handle (the frame was already closed, directly or
/// by an outer close) is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPoint {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// One recycled stack frame
pub struct GroupFrame {
    index: usize,
    generation: u64,
    depth: Depth,
    is_open: bool,
    is_rejected: bool,
    pub(crate) data: Option<LogData>,
    pub(crate) saved_filter: LogFilter,
    pub(crate) saved_tags: TagSet,
    pub(crate) saved_stack_trace: bool,
    /// Topic to restore on close (dependent-activity groups only)
    pub(crate) saved_topic: Option<String>,
    pub(crate) conclusion: Option<ConclusionFn>,
}

impl GroupFrame {
    fn recycled(index: usize) -> Self {
        Self {
            index,
            generation: 0,
            depth: 0,
            is_open: false,
            is_rejected: false,
            data: None,
            saved_filter: LogFilter::UNDEFINED,
            saved_tags: TagSet::empty(),
            saved_stack_trace: false,
            saved_topic: None,
            conclusion: None,
        }
    }

    /// Stack slot of this frame
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Visible depth (0 for rejected frames)
    #[inline]
    pub fn depth(&self) -> Depth {
        self.depth
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Filtered out at open: no payload, no client notification
    #[inline]
    pub fn is_rejected(&self) -> bool {
        self.is_rejected
    }

    /// Header payload (absent on rejected frames)
    #[inline]
    pub fn data(&self) -> Option<&LogData> {
        self.data.as_ref()
    }

    /// Handle for this incarnation of the frame
    #[inline]
    pub fn point(&self) -> GroupPoint {
        GroupPoint {
            index: self.index,
            generation: self.generation,
        }
    }
}

/// The recycled frame arena
pub(crate) struct GroupArena {
    frames: Vec<GroupFrame>,
    /// Open frames, rejected included
    open_count: usize,
    /// Open frames that carry data
    visible_count: usize,
}

impl GroupArena {
    pub(crate) fn new() -> Self {
        Self {
            frames: Vec::new(),
            open_count: 0,
            visible_count: 0,
        }
    }

    /// Reinitialize the next slot as an open frame and return it
    pub(crate) fn open_frame(&mut self, rejected: bool) -> &mut GroupFrame {
        if self.open_count == self.frames.len() {
            let grown = (self.frames.len() * 2).max(INITIAL_FRAMES);
            for index in self.frames.len()..grown {
                self.frames.push(GroupFrame::recycled(index));
            }
        }
        let visible_depth = self.visible_count;
        let frame = &mut self.frames[self.open_count];
        frame.generation += 1;
        frame.is_open = true;
        frame.is_rejected = rejected;
        frame.data = None;
        frame.saved_filter = LogFilter::UNDEFINED;
        frame.saved_tags = TagSet::empty();
        frame.saved_stack_trace = false;
        frame.saved_topic = None;
        frame.conclusion = None;
        frame.depth = if rejected {
            0
        } else {
            (visible_depth + 1).min(Depth::MAX as usize) as Depth
        };
        self.open_count += 1;
        if !rejected {
            self.visible_count += 1;
        }
        frame
    }

    /// Index of the top open frame
    #[inline]
    pub(crate) fn top_index(&self) -> Option<usize> {
        self.open_count.checked_sub(1)
    }

    pub(crate) fn top(&self) -> Option<&GroupFrame> {
        self.top_index().map(|index| &self.frames[index])
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut GroupFrame> {
        self.top_index().map(move |index| &mut self.frames[index])
    }

    /// Resolve a handle to its slot, if that incarnation is still open
    pub(crate) fn resolve(&self, point: GroupPoint) -> Option<usize> {
        let frame = self.frames.get(point.index)?;
        (frame.is_open && frame.generation == point.generation && point.index < self.open_count)
            .then_some(point.index)
    }

    /// Close the top frame and recycle its slot
    pub(crate) fn pop(&mut self) {
        if let Some(index) = self.top_index() {
            let frame = &mut self.frames[index];
            frame.is_open = false;
            frame.data = None;
            frame.saved_topic = None;
            frame.conclusion = None;
            if !frame.is_rejected {
                self.visible_count -= 1;
            }
            self.open_count -= 1;
        }
    }

    /// Depth visible to callers and payloads (non-rejected frames)
    #[inline]
    pub(crate) fn visible_depth(&self) -> Depth {
        self.visible_count.min(Depth::MAX as usize) as Depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::LogLevel;

    #[test]
    fn test_arena_grows_by_doubling() {
        let mut arena = GroupArena::new();
        for _ in 0..INITIAL_FRAMES {
            arena.open_frame(false);
        }
        assert_eq!(arena.frames.len(), INITIAL_FRAMES);
        arena.open_frame(false);
        assert_eq!(arena.frames.len(), INITIAL_FRAMES * 2);
    }

    #[test]
    fn test_slots_are_recycled_not_reallocated() {
        let mut arena = GroupArena::new();
        let first_generation = arena.open_frame(false).generation;
        arena.pop();
        let frame = arena.open_frame(false);
        assert_eq!(frame.index(), 0);
        assert_eq!(frame.generation, first_generation + 1);
    }

    #[test]
    fn test_stale_point_does_not_resolve() {
        let mut arena = GroupArena::new();
        let point = arena.open_frame(false).point();
        assert_eq!(arena.resolve(point), Some(0));
        arena.pop();
        assert_eq!(arena.resolve(point), None);
        // A recycled incarnation of the same slot keeps the old handle stale.
        arena.open_frame(false);
        assert_eq!(arena.resolve(point), None);
    }

    #[test]
    fn test_rejected_frames_occupy_slots_without_depth() {
        let mut arena = GroupArena::new();
        arena.open_frame(false);
        let rejected = arena.open_frame(true);
        assert_eq!(rejected.depth(), 0);
        assert!(rejected.is_rejected());
        assert_eq!(arena.visible_depth(), 1);
        let inner = arena.open_frame(false);
        assert_eq!(inner.depth(), 2);
        assert_eq!(arena.visible_depth(), 2);
    }

    #[test]
    fn test_frame_reinit_clears_previous_state() {
        let mut arena = GroupArena::new();
        {
            let frame = arena.open_frame(false);
            frame.data = Some(LogData::new(LogLevel::Info, "old"));
            frame.saved_topic = Some("old topic".to_owned());
        }
        arena.pop();
        let frame = arena.open_frame(false);
        assert!(frame.data.is_none());
        assert!(frame.saved_topic.is_none());
    }
}
