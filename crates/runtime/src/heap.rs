//! Object Heap
//!
//! The heap is the single owner of every object. It keeps three structures:
//!
//! ```text
//! slots (arena, owns objects)        objects (registry, allocation order)
//! ┌────┬────┬────┬────┬────┐          ┌────┬────┬────┐
//! │ v0 │ -- │ v2 │ v3 │ -- │          │ #0 │ #3 │ #2 │  GrowableStack<ObjRef>
//! └────┴────┴────┴────┴────┘          └────┴────┴────┘
//!   ↑ free_slots: [1, 4]
//!
//! frames: GrowableStack<Frame>  (each frame: GrowableStack<ObjRef> roots)
//! ```
//!
//! - Handles index into `slots`; a slot's generation changes every time it
//!   is freed, so stale handles never resolve.
//! - `objects` lists every live object in allocation order; sweep walks it,
//!   empties the entries it frees and compacts it.
//! - Frames, Arrays and Vector3s hold handles only. Nothing but sweep and
//!   teardown ever frees an object.
//!
//! Every allocation is charged to the heap's [`AllocCounter`] first, so a
//! counter with a limit makes construction fail cleanly before anything is
//! registered.

use crate::config::HeapConfig;
use crate::error::{HeapError, HeapResult};
use crate::frame::Frame;
use crate::value::{Kind, OBJECT_HEADER_BYTES, ObjRef, Object, Value, Vector3};
use snek_core::{AllocCounter, GrowableStack};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) object: Option<Object>,
}

/// Heap: object registry plus frame stack
pub struct Heap {
    pub(crate) slots: Vec<Slot>,
    free_slots: Vec<u32>,
    pub(crate) objects: GrowableStack<ObjRef>,
    pub(crate) frames: GrowableStack<Frame>,
    pub(crate) next_frame_id: u64,
    counter: Arc<AllocCounter>,
    config: HeapConfig,
}

impl Heap {
    /// Create a heap with default configuration and a private counter
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with the given configuration and a private counter
    pub fn with_config(config: HeapConfig) -> Self {
        Self::with_counter(config, Arc::new(AllocCounter::new()))
    }

    /// Create a heap that charges a caller-provided counter
    ///
    /// A `memory_limit` in the config is applied to the counter.
    pub fn with_counter(config: HeapConfig, counter: Arc<AllocCounter>) -> Self {
        if let Some(limit) = config.memory_limit {
            counter.set_limit(Some(limit));
        }

        Heap {
            slots: Vec::new(),
            free_slots: Vec::new(),
            objects: GrowableStack::new(config.initial_objects),
            frames: GrowableStack::new(config.initial_frames),
            next_frame_id: 1,
            counter,
            config,
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// The allocation counter this heap charges
    pub fn counter(&self) -> &Arc<AllocCounter> {
        &self.counter
    }

    // =========================================================================
    // Construction
    // =========================================================================

    pub fn new_integer(&mut self, value: i64) -> HeapResult<ObjRef> {
        self.charge_object(0)?;
        self.install(Value::Integer(value))
    }

    pub fn new_float(&mut self, value: f64) -> HeapResult<ObjRef> {
        self.charge_object(0)?;
        self.install(Value::Float(value))
    }

    /// Create a String holding an owned copy of `bytes`
    pub fn new_string(&mut self, bytes: impl AsRef<[u8]>) -> HeapResult<ObjRef> {
        let bytes = bytes.as_ref();
        self.alloc_string(bytes.len(), |_, buf| buf.extend_from_slice(bytes))
    }

    /// Create an Array of `size` empty slots
    pub fn new_array(&mut self, size: usize) -> HeapResult<ObjRef> {
        self.alloc_array(size, |_, _| {})
    }

    /// Create a Vector3 sharing the three given objects
    ///
    /// Every axis must be a live object; otherwise nothing is allocated.
    pub fn new_vector3(&mut self, x: ObjRef, y: ObjRef, z: ObjRef) -> HeapResult<ObjRef> {
        if !(self.contains(x) && self.contains(y) && self.contains(z)) {
            return Err(HeapError::InvalidArgument("vector3 axis is absent"));
        }
        self.charge_object(0)?;
        self.install(Value::Vector3(Vector3 { x, y, z }))
    }

    /// Charge, reserve and fill a String buffer of exactly `len` bytes
    pub(crate) fn alloc_string(
        &mut self,
        len: usize,
        fill: impl FnOnce(&Heap, &mut Vec<u8>),
    ) -> HeapResult<ObjRef> {
        self.charge_object(len)?;

        let mut buf = Vec::new();
        if buf.try_reserve_exact(len).is_err() {
            self.release_object_charge(len);
            return Err(self.allocation_failed(len));
        }
        fill(self, &mut buf);
        debug_assert_eq!(buf.len(), len);

        self.install(Value::String(buf.into_boxed_slice()))
    }

    /// Charge, reserve and fill an Array backing block of `size` slots
    pub(crate) fn alloc_array(
        &mut self,
        size: usize,
        fill: impl FnOnce(&Heap, &mut [Option<ObjRef>]),
    ) -> HeapResult<ObjRef> {
        let Some(block_bytes) = size.checked_mul(std::mem::size_of::<Option<ObjRef>>()) else {
            return Err(self.allocation_failed(usize::MAX));
        };
        self.charge_object(block_bytes)?;

        let mut elements = Vec::new();
        if elements.try_reserve_exact(size).is_err() {
            self.release_object_charge(block_bytes);
            return Err(self.allocation_failed(block_bytes));
        }
        elements.resize(size, None);
        fill(self, &mut elements);

        self.install(Value::Array(elements.into_boxed_slice()))
    }

    /// Place an already-charged value into a slot and register it
    fn install(&mut self, value: Value) -> HeapResult<ObjRef> {
        let buffer = value.buffer_bytes();
        let kind = value.kind();

        let obj = match self.alloc_slot(Object::new(value)) {
            Ok(obj) => obj,
            Err(e) => {
                self.release_object_charge(buffer);
                return Err(e);
            }
        };

        if let Err(e) = self.objects.push(obj) {
            self.free_slot(obj);
            warn!(?kind, "object registry could not grow");
            return Err(e.into());
        }

        trace!(?obj, ?kind, "allocated");
        Ok(obj)
    }

    fn alloc_slot(&mut self, object: Object) -> HeapResult<ObjRef> {
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return Ok(ObjRef {
                index,
                generation: slot.generation,
            });
        }

        let index = u32::try_from(self.slots.len())
            .map_err(|_| HeapError::AllocationFailed {
                requested: OBJECT_HEADER_BYTES,
            })?;

        // Keep free_slots able to hold every slot so freeing never allocates
        let free_room = self.slots.len() + 1 - self.free_slots.len();
        if self.slots.try_reserve(1).is_err() || self.free_slots.try_reserve(free_room).is_err() {
            return Err(HeapError::AllocationFailed {
                requested: OBJECT_HEADER_BYTES,
            });
        }

        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        Ok(ObjRef {
            index,
            generation: 0,
        })
    }

    /// Free the object in a slot and release its charge
    ///
    /// The registry entry is left to the caller.
    pub(crate) fn free_slot(&mut self, obj: ObjRef) -> Option<usize> {
        let slot = self.slots.get_mut(obj.index as usize)?;
        if slot.generation != obj.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(obj.index);

        let buffer = object.value.buffer_bytes();
        self.release_object_charge(buffer);
        Some(OBJECT_HEADER_BYTES + buffer)
    }

    /// Free every object registered after `checkpoint`
    ///
    /// Used to undo a compound operation that failed halfway. Objects
    /// registered after the checkpoint are only referenced by each other.
    pub(crate) fn rollback(&mut self, checkpoint: usize) {
        while self.objects.len() > checkpoint {
            if let Some(obj) = self.objects.pop() {
                self.free_slot(obj);
                trace!(?obj, "rolled back");
            }
        }
    }

    // =========================================================================
    // Accounting
    // =========================================================================

    /// Charge an object header plus an owned buffer as one unit
    fn charge_object(&self, buffer: usize) -> HeapResult<()> {
        if let Err(e) = self.counter.try_allocate(OBJECT_HEADER_BYTES) {
            warn!(%e, "object header allocation refused");
            return Err(e.into());
        }
        if buffer > 0
            && let Err(e) = self.counter.try_allocate(buffer)
        {
            self.counter.release(OBJECT_HEADER_BYTES);
            warn!(%e, "object buffer allocation refused");
            return Err(e.into());
        }
        Ok(())
    }

    fn release_object_charge(&self, buffer: usize) {
        if buffer > 0 {
            self.counter.release(buffer);
        }
        self.counter.release(OBJECT_HEADER_BYTES);
    }

    pub(crate) fn charge_frame(&self) -> HeapResult<()> {
        self.counter
            .try_allocate(std::mem::size_of::<Frame>())
            .map_err(|e| {
                warn!(%e, "frame allocation refused");
                e.into()
            })
    }

    pub(crate) fn release_frame_charge(&self) {
        self.counter.release(std::mem::size_of::<Frame>());
    }

    fn allocation_failed(&self, requested: usize) -> HeapError {
        warn!(requested, "buffer reservation failed");
        HeapError::AllocationFailed { requested }
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Look up a live object
    pub fn get(&self, obj: ObjRef) -> Option<&Object> {
        let slot = self.slots.get(obj.index as usize)?;
        if slot.generation != obj.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Object> {
        let slot = self.slots.get_mut(obj.index as usize)?;
        if slot.generation != obj.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Look up a live object's value, or report the handle as stale
    pub fn value(&self, obj: ObjRef) -> HeapResult<&Value> {
        self.get(obj)
            .map(Object::value)
            .ok_or(HeapError::StaleReference(obj))
    }

    /// True if the handle names a live object
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.get(obj).is_some()
    }

    pub fn kind(&self, obj: ObjRef) -> Option<Kind> {
        self.get(obj).map(Object::kind)
    }

    pub fn is_marked(&self, obj: ObjRef) -> Option<bool> {
        self.get(obj).map(Object::is_marked)
    }

    pub fn as_integer(&self, obj: ObjRef) -> Option<i64> {
        match self.get(obj)?.value() {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self, obj: ObjRef) -> Option<f64> {
        match self.get(obj)?.value() {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self, obj: ObjRef) -> Option<&[u8]> {
        match self.get(obj)?.value() {
            Value::String(bytes) => Some(&bytes[..]),
            _ => None,
        }
    }

    /// String contents, if the object is a String holding valid UTF-8
    pub fn as_str(&self, obj: ObjRef) -> Option<&str> {
        self.as_bytes(obj)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn vector3_axes(&self, obj: ObjRef) -> Option<Vector3> {
        match self.get(obj)?.value() {
            Value::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn array_elements(&self, obj: ObjRef) -> Option<&[Option<ObjRef>]> {
        match self.get(obj)?.value() {
            Value::Array(elements) => Some(&elements[..]),
            _ => None,
        }
    }

    /// Overwrite an Integer's payload in place
    ///
    /// Every container sharing the object sees the new value.
    pub fn set_integer(&mut self, obj: ObjRef, value: i64) -> HeapResult<()> {
        let object = self.get_mut(obj).ok_or(HeapError::StaleReference(obj))?;
        match &mut object.value {
            Value::Integer(v) => {
                *v = value;
                Ok(())
            }
            other => Err(HeapError::TypeMismatch {
                op: "set_integer",
                left: other.kind(),
                right: None,
            }),
        }
    }

    /// Overwrite a Float's payload in place
    pub fn set_float(&mut self, obj: ObjRef, value: f64) -> HeapResult<()> {
        let object = self.get_mut(obj).ok_or(HeapError::StaleReference(obj))?;
        match &mut object.value {
            Value::Float(v) => {
                *v = value;
                Ok(())
            }
            other => Err(HeapError::TypeMismatch {
                op: "set_float",
                left: other.kind(),
                right: None,
            }),
        }
    }

    /// Number of registered (live) objects
    pub fn object_count(&self) -> usize {
        self.objects.iter().count()
    }

    /// Registered objects in allocation order
    pub fn objects(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.objects.iter().copied()
    }

    // =========================================================================
    // Collection and teardown
    // =========================================================================

    /// Run one full mark, trace and sweep cycle
    pub fn collect_garbage(&mut self) -> HeapResult<crate::collector::CollectionStats> {
        crate::collector::Collector::collect(self)
    }

    /// Free every frame and every registered object, reachable or not
    ///
    /// Does not mark or trace. The heap stays usable (and empty) afterwards;
    /// dropping the heap runs this automatically.
    pub fn teardown(&mut self) {
        let mut frames = 0;
        for i in 0..self.frames.len() {
            if self.frames.take(i).is_some() {
                self.release_frame_charge();
                frames += 1;
            }
        }
        self.frames.clear();

        let mut objects = 0;
        for i in 0..self.objects.len() {
            if let Some(obj) = self.objects.take(i) {
                self.free_slot(obj);
                objects += 1;
            }
        }
        self.objects.clear();

        if frames > 0 || objects > 0 {
            debug!(frames, objects, "heap torn down");
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("objects", &self.object_count())
            .field("frames", &self.frames.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}
