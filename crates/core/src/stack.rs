//! Growable Stack Implementation
//!
//! A contiguous array of nullable slots with amortized O(1) push. The runtime
//! uses it in four roles: the heap's object registry, the frame stack, each
//! frame's root list, and the collector's trace worklist.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬─────────┐
//! │ Some(a)  │ None     │ Some(c)  │  None    │  None   │
//! └──────────┴──────────┴──────────┴──────────┴─────────┘
//!                                   ↑ count   capacity ↑
//! ```
//!
//! - Slots `[0, count)` are the logical contents; any of them may be emptied
//!   in place with [`GrowableStack::take`].
//! - Slots `[count, capacity)` are always `None`.
//! - [`GrowableStack::compact`] squeezes out emptied slots, preserving order,
//!   without releasing capacity.
//!
//! ## Growth
//!
//! Push on a full stack doubles the capacity. The reservation is fallible:
//! if the allocator refuses, the push reports [`CapacityOverflow`] and the
//! stack is left exactly as it was.

use std::fmt;

/// Default capacity used by the runtime for every stack role
pub const DEFAULT_STACK_CAPACITY: usize = 8;

/// The backing storage could not be grown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityOverflow {
    /// Capacity the stack tried to reach
    pub requested: usize,
}

impl fmt::Display for CapacityOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to grow stack to {} slots", self.requested)
    }
}

impl std::error::Error for CapacityOverflow {}

/// Amortized-growth stack of nullable slots
pub struct GrowableStack<T> {
    data: Vec<Option<T>>,
    count: usize,
    max_capacity: usize,
}

impl<T> GrowableStack<T> {
    /// Create a new stack with the given capacity
    ///
    /// Aborts on allocation failure like any `Vec`; use
    /// [`GrowableStack::try_with_capacity`] where that must be reported.
    pub fn new(capacity: usize) -> Self {
        let mut data = Vec::with_capacity(capacity);
        data.resize_with(capacity, || None);
        GrowableStack {
            data,
            count: 0,
            max_capacity: usize::MAX,
        }
    }

    /// Create a new stack, reporting allocation failure instead of aborting
    pub fn try_with_capacity(capacity: usize) -> Result<Self, CapacityOverflow> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| CapacityOverflow {
                requested: capacity,
            })?;
        data.resize_with(capacity, || None);
        Ok(GrowableStack {
            data,
            count: 0,
            max_capacity: usize::MAX,
        })
    }

    /// Create a new stack with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_STACK_CAPACITY)
    }

    /// Cap growth at `max_capacity` slots
    ///
    /// A push that would need more fails with [`CapacityOverflow`]. A cap
    /// below the current capacity only stops further growth.
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Number of logical slots (occupied or emptied in place)
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the stack is empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total capacity of the stack (number of slots)
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Grow the stack to accommodate more values
    ///
    /// Doubles capacity by default, or grows to `min_capacity` if larger.
    /// Never grows past the maximum capacity.
    pub fn grow(&mut self, min_capacity: usize) -> Result<(), CapacityOverflow> {
        if min_capacity > self.max_capacity {
            return Err(CapacityOverflow {
                requested: min_capacity,
            });
        }
        let new_capacity = self
            .capacity()
            .saturating_mul(2)
            .max(min_capacity)
            .min(self.max_capacity);
        if new_capacity <= self.capacity() {
            return Ok(());
        }

        self.data
            .try_reserve_exact(new_capacity - self.capacity())
            .map_err(|_| CapacityOverflow {
                requested: new_capacity,
            })?;
        self.data.resize_with(new_capacity, || None);
        Ok(())
    }

    /// Push a value onto the stack
    ///
    /// Grows the stack if necessary.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), CapacityOverflow> {
        if self.count >= self.capacity() {
            self.grow(self.count + 1)?;
        }
        self.data[self.count] = Some(value);
        self.count += 1;
        Ok(())
    }

    /// Pop the top slot
    ///
    /// Returns `None` when the stack is empty. A slot that was emptied in
    /// place also pops as `None`; callers that need to skip those should
    /// [`compact`](GrowableStack::compact) first.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        self.data[self.count].take()
    }

    /// Peek at the top value without removing it
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.count.checked_sub(1).and_then(|top| self.get(top))
    }

    /// Get the value in a logical slot
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.count {
            self.data[index].as_ref()
        } else {
            None
        }
    }

    /// Get a mutable reference to the value in a logical slot
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.count {
            self.data[index].as_mut()
        } else {
            None
        }
    }

    /// Empty a slot in place, returning what it held
    ///
    /// The logical length is unchanged until the next compaction.
    pub fn take(&mut self, index: usize) -> Option<T> {
        if index < self.count {
            self.data[index].take()
        } else {
            None
        }
    }

    /// Remove emptied slots, preserving the order of the survivors
    ///
    /// Single forward pass; capacity is never released so the next round of
    /// pushes after a sweep does not reallocate.
    pub fn compact(&mut self) {
        let mut kept = 0;
        for i in 0..self.count {
            if self.data[i].is_some() {
                if i != kept {
                    self.data.swap(i, kept);
                }
                kept += 1;
            }
        }

        for slot in &mut self.data[kept..] {
            *slot = None;
        }
        self.count = kept;
    }

    /// Drop every value, keeping capacity
    pub fn clear(&mut self) {
        for slot in &mut self.data[..self.count] {
            *slot = None;
        }
        self.count = 0;
    }

    /// Iterate over occupied slots, bottom to top
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.data[..self.count].iter().filter_map(Option::as_ref)
    }

    /// Iterate mutably over occupied slots, bottom to top
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> + '_ {
        self.data[..self.count].iter_mut().filter_map(Option::as_mut)
    }
}

impl<T> Default for GrowableStack<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<T: fmt::Debug> fmt::Debug for GrowableStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowableStack")
            .field("count", &self.count)
            .field("capacity", &self.capacity())
            .field("max_capacity", &self.max_capacity)
            .field("data", &&self.data[..self.count])
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
