//! Mark-Sweep Collector
//!
//! A cycle runs three phases back to back, synchronously, with the heap
//! borrowed mutably for the whole cycle:
//!
//! ```text
//!   mark            trace                       sweep
//! ┌────────┐    ┌──────────────────────┐    ┌──────────────────────────┐
//! │ frames │ →  │ gray = marked objects│ →  │ registry in order:       │
//! │ roots  │    │ pop, mark unmarked   │    │  marked   → unmark, keep │
//! │ marked │    │ children, push them  │    │  unmarked → free, empty  │
//! └────────┘    └──────────────────────┘    │ compact registry         │
//!                                           └──────────────────────────┘
//! ```
//!
//! Entry invariant: no object is marked. Sweep restores it for the next
//! cycle; `collect` also clears marks left behind by a phase that was run on
//! its own without a sweep, so a stale mark never keeps an object alive.
//! A child is marked *before* it is pushed onto the worklist, so an
//! object reachable along several paths (a Vector3 whose axes are all the
//! same object, an Array stored inside itself) is pushed exactly once.
//!
//! If the worklist cannot grow (allocation failure, or `max_worklist` in the
//! heap config), the cycle is abandoned before sweep: every mark is cleared
//! and nothing is freed.

use crate::error::HeapResult;
use crate::heap::{Heap, Slot};
use crate::value::{ObjRef, Object, Value};
use snek_core::GrowableStack;
use tracing::{debug, trace, warn};

/// Summary of one collection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Distinct objects marked directly from frame roots
    pub roots: usize,
    /// Objects marked by tracing through containers
    pub traced: usize,
    /// Objects freed by sweep
    pub freed: usize,
    /// Objects that survived sweep
    pub survivors: usize,
    /// Bytes released to the allocation counter
    pub freed_bytes: usize,
}

/// Result of the sweep phase on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub freed: usize,
    pub survivors: usize,
    pub freed_bytes: usize,
}

/// Stateless mark, trace and sweep over a [`Heap`]
pub struct Collector;

impl Collector {
    /// Run one full cycle
    pub fn collect(heap: &mut Heap) -> HeapResult<CollectionStats> {
        Self::clear_marks(heap);
        let roots = Self::mark(heap);

        let traced = match Self::trace(heap) {
            Ok(traced) => traced,
            Err(e) => {
                Self::clear_marks(heap);
                warn!(%e, "trace worklist exhausted, collection abandoned");
                return Err(e);
            }
        };

        let sweep = Self::sweep(heap);
        let stats = CollectionStats {
            roots,
            traced,
            freed: sweep.freed,
            survivors: sweep.survivors,
            freed_bytes: sweep.freed_bytes,
        };

        debug!(
            roots = stats.roots,
            traced = stats.traced,
            freed = stats.freed,
            survivors = stats.survivors,
            freed_bytes = stats.freed_bytes,
            "collection finished"
        );
        Ok(stats)
    }

    /// Mark every object referenced by a frame on the frame stack
    ///
    /// Objects reachable only through containers stay unmarked until trace.
    /// Returns the number of distinct objects marked.
    pub fn mark(heap: &mut Heap) -> usize {
        let mut marked = 0;
        for frame in heap.frames.iter() {
            for root in frame.roots() {
                if let Some(object) = lookup_mut(&mut heap.slots, root)
                    && !object.marked
                {
                    object.marked = true;
                    marked += 1;
                }
            }
        }
        marked
    }

    /// Extend the marks to everything reachable from an already-marked object
    ///
    /// Returns the number of objects newly marked.
    pub fn trace(heap: &mut Heap) -> HeapResult<usize> {
        let max = heap.config().max_worklist.unwrap_or(usize::MAX);
        let initial = heap.config().initial_worklist.min(max);
        let mut gray: GrowableStack<ObjRef> =
            GrowableStack::try_with_capacity(initial)?.with_max_capacity(max);

        for &obj in heap.objects.iter() {
            if heap.get(obj).is_some_and(Object::is_marked) {
                gray.push(obj)?;
            }
        }

        let mut traced = 0;
        while let Some(obj) = gray.pop() {
            traced += blacken(&mut heap.slots, &mut gray, obj)?;
        }
        Ok(traced)
    }

    /// Free every unmarked registered object and unmark the survivors
    pub fn sweep(heap: &mut Heap) -> SweepStats {
        let mut stats = SweepStats::default();

        for i in 0..heap.objects.len() {
            let Some(&obj) = heap.objects.get(i) else {
                continue;
            };

            match heap.is_marked(obj) {
                Some(true) => {
                    if let Some(object) = heap.get_mut(obj) {
                        object.marked = false;
                    }
                    stats.survivors += 1;
                }
                Some(false) => {
                    heap.objects.take(i);
                    if let Some(bytes) = heap.free_slot(obj) {
                        stats.freed += 1;
                        stats.freed_bytes += bytes;
                        trace!(?obj, bytes, "freed");
                    }
                }
                None => {
                    heap.objects.take(i);
                }
            }
        }

        heap.objects.compact();
        stats
    }

    fn clear_marks(heap: &mut Heap) {
        for slot in heap.slots.iter_mut() {
            if let Some(object) = slot.object.as_mut() {
                object.marked = false;
            }
        }
    }
}

fn lookup(slots: &[Slot], obj: ObjRef) -> Option<&Object> {
    let slot = slots.get(obj.index as usize)?;
    if slot.generation != obj.generation {
        return None;
    }
    slot.object.as_ref()
}

fn lookup_mut(slots: &mut [Slot], obj: ObjRef) -> Option<&mut Object> {
    let slot = slots.get_mut(obj.index as usize)?;
    if slot.generation != obj.generation {
        return None;
    }
    slot.object.as_mut()
}

/// Visit the children of a gray object, graying the unmarked ones
fn blacken(
    slots: &mut [Slot],
    gray: &mut GrowableStack<ObjRef>,
    obj: ObjRef,
) -> HeapResult<usize> {
    let child_count = match lookup(slots, obj).map(Object::value) {
        Some(Value::Vector3(_)) => 3,
        Some(Value::Array(elements)) => elements.len(),
        _ => 0,
    };

    let mut marked = 0;
    for i in 0..child_count {
        let child = match lookup(slots, obj).map(Object::value) {
            Some(Value::Vector3(v)) => Some(v.axes()[i]),
            Some(Value::Array(elements)) => elements[i],
            _ => None,
        };
        if let Some(child) = child
            && mark_object(slots, gray, child)?
        {
            marked += 1;
        }
    }
    Ok(marked)
}

/// Mark one object and push it onto the worklist, unless already marked
fn mark_object(
    slots: &mut [Slot],
    gray: &mut GrowableStack<ObjRef>,
    obj: ObjRef,
) -> HeapResult<bool> {
    let Some(object) = lookup_mut(slots, obj) else {
        return Ok(false);
    };
    if object.marked {
        return Ok(false);
    }
    object.marked = true;
    gray.push(obj)?;
    Ok(true)
}
