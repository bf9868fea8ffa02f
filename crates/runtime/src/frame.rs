//! Frames: the root set
//!
//! A frame is one rooting scope. Its root list is a `GrowableStack` of
//! handles; attaching an object to a frame with
//! [`Heap::frame_reference_object`] is the only way to make it a root. There
//! is no scanning of the native call stack or of globals.
//!
//! Frames never own the objects they root. Releasing a frame only drops its
//! root list; whatever it rooted becomes collectible once no other live frame
//! (and no reachable container) still refers to it.

use crate::error::{HeapError, HeapResult};
use crate::heap::Heap;
use crate::value::ObjRef;
use snek_core::GrowableStack;
use std::fmt;
use tracing::trace;

/// Identifier of a frame on a heap's frame stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame #{}", self.0)
    }
}

/// One rooting scope
#[derive(Debug)]
pub struct Frame {
    id: FrameId,
    references: GrowableStack<ObjRef>,
}

impl Frame {
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Objects this frame roots, in the order they were attached
    pub fn roots(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.references.iter().copied()
    }

    pub fn root_count(&self) -> usize {
        self.references.len()
    }
}

impl Heap {
    /// Push a new, empty frame and return its id
    pub fn new_frame(&mut self) -> HeapResult<FrameId> {
        self.charge_frame()?;

        let references = match GrowableStack::try_with_capacity(self.config().initial_roots) {
            Ok(references) => references,
            Err(e) => {
                self.release_frame_charge();
                return Err(e.into());
            }
        };

        let id = FrameId(self.next_frame_id);
        if let Err(e) = self.frames.push(Frame { id, references }) {
            self.release_frame_charge();
            return Err(e.into());
        }
        self.next_frame_id += 1;

        trace!(%id, depth = self.frames.len(), "frame pushed");
        Ok(id)
    }

    /// Pop the top frame and release its root list
    ///
    /// Returns `None` when the frame stack is empty.
    pub fn pop_frame(&mut self) -> Option<FrameId> {
        let frame = self.frames.pop()?;
        self.release_frame_charge();
        trace!(id = %frame.id, roots = frame.root_count(), "frame popped");
        Some(frame.id)
    }

    /// Release a frame wherever it sits on the frame stack
    ///
    /// Returns false if no live frame has this id.
    pub fn free_frame(&mut self, id: FrameId) -> bool {
        let Some(position) = self.frame_position(id) else {
            return false;
        };

        if let Some(frame) = self.frames.take(position) {
            self.release_frame_charge();
            trace!(%id, roots = frame.root_count(), "frame freed");
        }
        self.frames.compact();
        true
    }

    /// Root `obj` in `frame`
    ///
    /// The same object may be attached to any number of frames, or several
    /// times to one frame.
    pub fn frame_reference_object(&mut self, frame: FrameId, obj: ObjRef) -> HeapResult<()> {
        if !self.contains(obj) {
            return Err(HeapError::StaleReference(obj));
        }
        let position = self
            .frame_position(frame)
            .ok_or(HeapError::UnknownFrame(frame))?;

        let target = self
            .frames
            .get_mut(position)
            .ok_or(HeapError::UnknownFrame(frame))?;
        target.references.push(obj)?;
        Ok(())
    }

    /// Look up a live frame
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.iter().rev().find(|frame| frame.id == id)
    }

    /// Roots of a live frame, in attach order
    pub fn frame_roots(&self, id: FrameId) -> Option<impl Iterator<Item = ObjRef> + '_> {
        self.frame(id).map(Frame::roots)
    }

    /// Id of the frame on top of the frame stack
    pub fn current_frame(&self) -> Option<FrameId> {
        self.frames.peek().map(Frame::id)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frames from bottom to top
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.iter()
    }

    fn frame_position(&self, id: FrameId) -> Option<usize> {
        (0..self.frames.len())
            .rev()
            .find(|&i| self.frames.get(i).is_some_and(|frame| frame.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use snek_core::AllocCounter;
    use std::sync::Arc;

    #[test]
    fn test_frames_push_and_pop_in_order() {
        let mut heap = Heap::new();
        assert_eq!(heap.pop_frame(), None);

        let f1 = heap.new_frame().unwrap();
        let f2 = heap.new_frame().unwrap();
        assert_ne!(f1, f2);
        assert_eq!(heap.frame_count(), 2);
        assert_eq!(heap.current_frame(), Some(f2));

        assert_eq!(heap.pop_frame(), Some(f2));
        assert_eq!(heap.current_frame(), Some(f1));
        assert_eq!(heap.pop_frame(), Some(f1));
        assert_eq!(heap.pop_frame(), None);
    }

    #[test]
    fn test_reference_object_appends_roots() {
        let mut heap = Heap::new();
        let frame = heap.new_frame().unwrap();
        let a = heap.new_integer(1).unwrap();
        let b = heap.new_integer(2).unwrap();

        heap.frame_reference_object(frame, a).unwrap();
        heap.frame_reference_object(frame, b).unwrap();
        heap.frame_reference_object(frame, a).unwrap();

        let roots: Vec<_> = heap.frame_roots(frame).unwrap().collect();
        assert_eq!(roots, vec![a, b, a]);
        assert_eq!(heap.frame(frame).unwrap().root_count(), 3);
    }

    #[test]
    fn test_root_list_grows() {
        let config = HeapConfig {
            initial_roots: 1,
            ..HeapConfig::default()
        };
        let mut heap = Heap::with_config(config);
        let frame = heap.new_frame().unwrap();
        for i in 0..20 {
            let obj = heap.new_integer(i).unwrap();
            heap.frame_reference_object(frame, obj).unwrap();
        }
        assert_eq!(heap.frame(frame).unwrap().root_count(), 20);
    }

    #[test]
    fn test_reference_unknown_frame() {
        let mut heap = Heap::new();
        let frame = heap.new_frame().unwrap();
        let obj = heap.new_integer(1).unwrap();
        heap.pop_frame();

        assert_eq!(
            heap.frame_reference_object(frame, obj),
            Err(HeapError::UnknownFrame(frame))
        );
    }

    #[test]
    fn test_reference_stale_object() {
        let mut heap = Heap::new();
        let obj = heap.new_integer(1).unwrap();
        heap.collect_garbage().unwrap();

        let frame = heap.new_frame().unwrap();
        assert_eq!(
            heap.frame_reference_object(frame, obj),
            Err(HeapError::StaleReference(obj))
        );
        assert_eq!(heap.frame(frame).unwrap().root_count(), 0);
    }

    #[test]
    fn test_free_frame_from_middle() {
        let mut heap = Heap::new();
        let f1 = heap.new_frame().unwrap();
        let f2 = heap.new_frame().unwrap();
        let f3 = heap.new_frame().unwrap();

        assert!(heap.free_frame(f2));
        assert!(!heap.free_frame(f2));
        assert_eq!(heap.frame_count(), 2);

        let ids: Vec<_> = heap.frames().map(Frame::id).collect();
        assert_eq!(ids, vec![f1, f3]);
        assert_eq!(heap.pop_frame(), Some(f3));
    }

    #[test]
    fn test_frame_accounting() {
        let counter = Arc::new(AllocCounter::new());
        let mut heap = Heap::with_counter(HeapConfig::default(), Arc::clone(&counter));

        let f1 = heap.new_frame().unwrap();
        heap.new_frame().unwrap();
        assert_eq!(counter.live_allocations(), 2);

        heap.pop_frame();
        assert!(heap.free_frame(f1));
        assert!(counter.all_freed());
    }

    #[test]
    fn test_frame_refused_by_limit() {
        let counter = Arc::new(AllocCounter::with_limit(1));
        let mut heap = Heap::with_counter(HeapConfig::default(), Arc::clone(&counter));

        assert!(matches!(
            heap.new_frame(),
            Err(HeapError::AllocationFailed { .. })
        ));
        assert_eq!(heap.frame_count(), 0);
        assert!(counter.all_freed());
    }

    #[test]
    fn test_frame_ids_not_reused() {
        let mut heap = Heap::new();
        let f1 = heap.new_frame().unwrap();
        heap.pop_frame();
        let f2 = heap.new_frame().unwrap();
        assert_ne!(f1, f2);
        assert!(heap.frame(f1).is_none());
    }
}
