//! Fixed-capacity staging buffer pool with reference-count recycling.
//!
//! Slots are reclaimed by probing the shared handle's reference count: a slot
//! whose `Arc` has no clones outside the pool is free for the next capture.
//! This is best-effort against driver-side async release (see DESIGN.md); a
//! slot mid-read by a hardware encoder holds a clone and is never overwritten.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use tracing::{trace, warn};

use crate::capture::frame::PixelFormat;
use crate::device::{CaptureDevice, StagingTexture};

enum Slot {
    Empty,
    Allocated(Arc<dyn StagingTexture>),
}

impl Slot {
    /// True when no consumer outside the pool still references the buffer.
    fn try_reclaim(&self) -> bool {
        match self {
            Slot::Empty => true,
            Slot::Allocated(staging) => Arc::strong_count(staging) == 1,
        }
    }
}

/// Statistics
#[derive(Default)]
struct Stats {
    acquired: AtomicUsize,
    exhausted: AtomicUsize,
    reallocations: AtomicUsize,
}

/// Arena of staging buffers, scanned in fixed order on every acquire.
pub struct StagingPool {
    slots: Vec<Slot>,
    device: Arc<dyn CaptureDevice>,

    /// Statistics
    stats: CachePadded<Stats>,
}

impl StagingPool {
    pub fn new(device: Arc<dyn CaptureDevice>, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Empty);
        Self {
            slots,
            device,
            stats: CachePadded::new(Stats::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Hand out a staging buffer sized to the request, or `None` when every
    /// slot is still in flight or the device refuses the allocation. Callers
    /// skip the frame on `None`; the pool never grows.
    pub fn acquire(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Option<Arc<dyn StagingTexture>> {
        let slot_id = self.slots.iter().position(Slot::try_reclaim);
        let Some(slot_id) = slot_id else {
            self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
            trace!("all staging slots in flight, dropping frame");
            return None;
        };

        let needs_alloc = match &self.slots[slot_id] {
            Slot::Empty => true,
            Slot::Allocated(staging) => staging.width() != width || staging.height() != height,
        };

        if needs_alloc {
            // Release the old buffer before asking the device for a new one;
            // this is the resize path when the render target changes size.
            if let Slot::Allocated(_) = self.slots[slot_id] {
                self.stats.reallocations.fetch_add(1, Ordering::Relaxed);
                trace!(slot_id, width, height, "resizing staging slot");
            }
            self.slots[slot_id] = Slot::Empty;

            match self.device.create_staging(width, height, format) {
                Ok(staging) => self.slots[slot_id] = Slot::Allocated(staging),
                Err(e) => {
                    warn!(slot_id, "staging allocation failed: {e}");
                    self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        if let Slot::Allocated(staging) = &self.slots[slot_id] {
            self.stats.acquired.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(staging));
        }
        None
    }

    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.acquired.load(Ordering::Relaxed),
            self.stats.exhausted.load(Ordering::Relaxed),
            self.stats.reallocations.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::device::testing::MockDevice;

    fn pool(capacity: usize) -> (Arc<MockDevice>, StagingPool) {
        let device = Arc::new(MockDevice::default());
        let pool = StagingPool::new(Arc::clone(&device) as Arc<dyn CaptureDevice>, capacity);
        (device, pool)
    }

    #[test]
    fn acquire_beyond_capacity_fails_without_growing() {
        let (device, mut pool) = pool(3);
        let held: Vec<_> = (0..3)
            .map(|_| pool.acquire(64, 64, PixelFormat::Bgra8).unwrap())
            .collect();

        for _ in 0..5 {
            assert!(pool.acquire(64, 64, PixelFormat::Bgra8).is_none());
        }
        assert_eq!(pool.capacity(), 3);
        assert_eq!(device.allocations.load(Ordering::Relaxed), 3);

        let (acquired, exhausted, _) = pool.stats();
        assert_eq!(acquired, 3);
        assert_eq!(exhausted, 5);
        drop(held);
    }

    #[test]
    fn released_slot_is_reused_without_reallocation() {
        let (device, mut pool) = pool(2);
        let first = pool.acquire(64, 64, PixelFormat::Bgra8).unwrap();
        drop(first);

        let again = pool.acquire(64, 64, PixelFormat::Bgra8).unwrap();
        assert_eq!(device.allocations.load(Ordering::Relaxed), 1);
        assert_eq!(again.width(), 64);
    }

    #[test]
    fn held_slot_is_never_handed_out_twice() {
        let (_device, mut pool) = pool(2);
        let first = pool.acquire(64, 64, PixelFormat::Bgra8).unwrap();
        let second = pool.acquire(64, 64, PixelFormat::Bgra8).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn dimension_change_reallocates_in_place() {
        let (device, mut pool) = pool(1);
        let first = pool.acquire(64, 64, PixelFormat::Bgra8).unwrap();
        drop(first);

        let resized = pool.acquire(128, 32, PixelFormat::Bgra8).unwrap();
        assert_eq!(resized.width(), 128);
        assert_eq!(resized.height(), 32);
        assert_eq!(device.allocations.load(Ordering::Relaxed), 2);

        let (_, _, reallocations) = pool.stats();
        assert_eq!(reallocations, 1);
    }

    #[test]
    fn allocation_failure_degrades_to_none_and_recovers() {
        let (device, mut pool) = pool(2);
        device.fail_allocation.store(true, Ordering::Relaxed);
        assert!(pool.acquire(64, 64, PixelFormat::Bgra8).is_none());

        device.fail_allocation.store(false, Ordering::Relaxed);
        assert!(pool.acquire(64, 64, PixelFormat::Bgra8).is_some());
    }

    #[test]
    fn consumer_release_makes_slot_eligible_again() {
        let (_device, mut pool) = pool(1);
        let held = pool.acquire(64, 64, PixelFormat::Bgra8).unwrap();

        // Simulates a hardware encoder still reading the buffer.
        assert!(pool.acquire(64, 64, PixelFormat::Bgra8).is_none());

        drop(held);
        assert!(pool.acquire(64, 64, PixelFormat::Bgra8).is_some());
    }
}
