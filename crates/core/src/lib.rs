//! Snek Core: shared foundation for the snek object runtime
//!
//! This crate holds the pieces of the runtime that know nothing about
//! values or collection:
//!
//! - `stack`: `GrowableStack`, the amortized-growth stack of nullable slots
//!   used as object registry, frame stack, root list and trace worklist
//! - `memory_stats`: `AllocCounter`, the explicit allocation-accounting
//!   capability the heap charges for every allocation it makes

pub mod memory_stats;
pub mod stack;

pub use memory_stats::{AllocCounter, AllocStats, LimitExceeded};
pub use stack::{CapacityOverflow, DEFAULT_STACK_CAPACITY, GrowableStack};
