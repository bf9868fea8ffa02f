//! Allocation accounting for the object heap
//!
//! An [`AllocCounter`] is handed to the heap explicitly; the heap charges it
//! for every object header and owned buffer it creates and credits it when
//! those are freed. Tests hold a second `Arc` to the same counter and assert
//! that everything was returned.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                AllocCounter                 │
//! ├─────────────────────────────────────────────┤
//! │ live_allocations: u64   (outstanding blocks)│
//! │ live_bytes:       u64   (outstanding bytes) │
//! │ peak_bytes:       u64   (high-water mark)   │
//! │ total_allocations: u64  (ever charged)      │
//! │ limit:            Option<u64>               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Counters are atomics so a counter can be shared through `Arc` and read
//! from anywhere; the heap itself is single-threaded. With no limit the
//! counter is a pure pass-through and never refuses an allocation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The counter refused an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitExceeded {
    /// Bytes the caller asked for
    pub requested: usize,
    /// Bytes outstanding at the time of the request
    pub live_bytes: u64,
    /// Configured byte budget
    pub limit: u64,
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocation of {} bytes exceeds limit ({} of {} bytes in use)",
            self.requested, self.live_bytes, self.limit
        )
    }
}

impl std::error::Error for LimitExceeded {}

/// Counting allocator capability
#[derive(Debug)]
pub struct AllocCounter {
    live_allocations: AtomicU64,
    live_bytes: AtomicU64,
    peak_bytes: AtomicU64,
    total_allocations: AtomicU64,
    /// Byte budget (0 = unlimited)
    limit: AtomicU64,
}

impl AllocCounter {
    /// Create an unlimited counter
    pub const fn new() -> Self {
        Self {
            live_allocations: AtomicU64::new(0),
            live_bytes: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
            total_allocations: AtomicU64::new(0),
            limit: AtomicU64::new(0),
        }
    }

    /// Create a counter that refuses allocations past `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        let counter = Self::new();
        counter.set_limit(Some(limit));
        counter
    }

    /// Change the byte budget; `None` removes it
    ///
    /// Lowering the limit below what is already live does not free anything,
    /// it only makes subsequent charges fail.
    pub fn set_limit(&self, limit: Option<usize>) {
        let raw = limit.map(|l| (l as u64).max(1)).unwrap_or(0);
        self.limit.store(raw, Ordering::Relaxed);
    }

    /// Current byte budget
    pub fn limit(&self) -> Option<usize> {
        match self.limit.load(Ordering::Relaxed) {
            0 => None,
            l => Some(l as usize),
        }
    }

    /// Charge one allocation of `bytes`
    ///
    /// Fails without changing any counter when the limit would be exceeded,
    /// or when the live byte count would overflow (reported against a limit
    /// of `u64::MAX` on an unlimited counter).
    pub fn try_allocate(&self, bytes: usize) -> Result<(), LimitExceeded> {
        let bytes64 = bytes as u64;
        let limit = self.limit.load(Ordering::Relaxed);

        let mut live = self.live_bytes.load(Ordering::Relaxed);
        loop {
            let next = match live.checked_add(bytes64) {
                Some(next) if limit == 0 || next <= limit => next,
                _ => {
                    return Err(LimitExceeded {
                        requested: bytes,
                        live_bytes: live,
                        limit: if limit == 0 { u64::MAX } else { limit },
                    });
                }
            };
            match self.live_bytes.compare_exchange_weak(
                live,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    live = next;
                    break;
                }
                Err(current) => live = current,
            }
        }

        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);

        // Update peak via CAS loop
        let mut peak = self.peak_bytes.load(Ordering::Relaxed);
        while live > peak {
            match self.peak_bytes.compare_exchange_weak(
                peak,
                live,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }

        Ok(())
    }

    /// Credit back one allocation of `bytes`
    pub fn release(&self, bytes: usize) {
        let bytes = bytes as u64;
        let _ = self
            .live_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                Some(live.saturating_sub(bytes))
            });
        let _ = self
            .live_allocations
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                Some(live.saturating_sub(1))
            });
    }

    /// Number of outstanding allocations
    pub fn live_allocations(&self) -> u64 {
        self.live_allocations.load(Ordering::Relaxed)
    }

    /// Number of outstanding bytes
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// True when every charged allocation has been released
    pub fn all_freed(&self) -> bool {
        self.live_allocations() == 0 && self.live_bytes() == 0
    }

    /// Get a consistent-enough copy of all counters
    pub fn snapshot(&self) -> AllocStats {
        AllocStats {
            live_allocations: self.live_allocations.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
        }
    }
}

impl Default for AllocCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of an [`AllocCounter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocStats {
    pub live_allocations: u64,
    pub live_bytes: u64,
    pub peak_bytes: u64,
    pub total_allocations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = AllocCounter::new();
        assert!(counter.all_freed());

        counter.try_allocate(64).unwrap();
        counter.try_allocate(16).unwrap();

        let stats = counter.snapshot();
        assert_eq!(stats.live_allocations, 2);
        assert_eq!(stats.live_bytes, 80);
        assert_eq!(stats.total_allocations, 2);
        assert!(!counter.all_freed());

        counter.release(64);
        counter.release(16);
        assert!(counter.all_freed());
    }

    #[test]
    fn test_peak_is_high_water_mark() {
        let counter = AllocCounter::new();

        counter.try_allocate(100).unwrap();
        counter.try_allocate(50).unwrap();
        counter.release(100);
        counter.try_allocate(10).unwrap();

        let stats = counter.snapshot();
        assert_eq!(stats.peak_bytes, 150);
        assert_eq!(stats.live_bytes, 60);
        assert_eq!(stats.total_allocations, 3);
    }

    #[test]
    fn test_limit_refuses_without_side_effects() {
        let counter = AllocCounter::with_limit(100);
        counter.try_allocate(60).unwrap();

        let err = counter.try_allocate(41).unwrap_err();
        assert_eq!(err.requested, 41);
        assert_eq!(err.live_bytes, 60);
        assert_eq!(err.limit, 100);

        let stats = counter.snapshot();
        assert_eq!(stats.live_allocations, 1);
        assert_eq!(stats.live_bytes, 60);

        // Exactly at the limit is fine
        counter.try_allocate(40).unwrap();
        assert_eq!(counter.live_bytes(), 100);
    }

    #[test]
    fn test_set_limit_later() {
        let counter = AllocCounter::new();
        assert_eq!(counter.limit(), None);

        counter.try_allocate(10).unwrap();
        counter.set_limit(Some(5));
        assert_eq!(counter.limit(), Some(5));
        assert!(counter.try_allocate(1).is_err());

        counter.set_limit(None);
        assert!(counter.try_allocate(1).is_ok());
    }

    #[test]
    fn test_release_never_underflows() {
        let counter = AllocCounter::new();
        counter.release(8);
        assert!(counter.all_freed());
    }

    #[test]
    fn test_shared_between_threads() {
        use std::sync::Arc;
        use std::thread;

        let counter = Arc::new(AllocCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        counter.try_allocate(8).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(counter.live_allocations(), 400);
        assert_eq!(counter.live_bytes(), 3200);
    }

    #[test]
    fn test_overflowing_charge_refused() {
        let counter = AllocCounter::new();
        counter.try_allocate(44).unwrap();
        let before = counter.snapshot();

        let err = counter.try_allocate(usize::MAX).unwrap_err();
        assert_eq!(err.live_bytes, 44);
        assert_eq!(err.limit, u64::MAX);

        let after = counter.snapshot();
        assert_eq!(after.live_bytes, before.live_bytes);
        assert_eq!(after.peak_bytes, before.peak_bytes);
        assert_eq!(after.live_allocations, 1);
    }
}
