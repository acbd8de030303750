//! Heap-backed DMA allocator.
//!
//! Backs every region with an ordinary global-heap allocation and assigns it a
//! fabricated device address from a bump pointer. The device address space is
//! disjoint from the heap, so any code path that confuses physical and virtual
//! addresses faults immediately instead of happening to work. Hosted tests and
//! device emulators use this in place of a real contiguous-frame allocator.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::collections::BTreeMap;
use spin::Mutex;

use super::dma::DmaAllocator;
use super::{AllocError, AllocResult, DmaRegion};
use crate::config::RING_SEGMENT_BOUNDARY;

/// First fabricated device address handed out.
pub const HEAP_DMA_PHYS_BASE: u64 = 0x1000_0000;

struct HeapState {
    next_phys: u64,
    live_bytes: usize,
    /// phys -> (virt, layout)
    live: BTreeMap<u64, (u64, Layout)>,
}

/// Allocator that fabricates device addresses for heap memory.
pub struct HeapDmaAllocator {
    state: Mutex<HeapState>,
    limit: Option<usize>,
}

impl HeapDmaAllocator {
    /// Unlimited allocator.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(HeapState {
                next_phys: HEAP_DMA_PHYS_BASE,
                live_bytes: 0,
                live: BTreeMap::new(),
            }),
            limit: None,
        }
    }

    /// Allocator that fails with `OutOfMemory` once `bytes` are live.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            ..Self::new()
        }
    }

    /// Number of regions not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Bytes currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.state.lock().live_bytes
    }
}

impl Default for HeapDmaAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Next device address at or after `from` aligned to `align` that keeps
/// `[addr, addr + size)` inside one 64 KiB segment when it fits in one.
fn place(from: u64, size: usize, align: usize) -> u64 {
    let align = align as u64;
    let mut addr = (from + align - 1) & !(align - 1);
    let boundary = RING_SEGMENT_BOUNDARY as u64;
    if (size as u64) <= boundary && addr / boundary != (addr + size as u64 - 1) / boundary {
        addr = (addr / boundary + 1) * boundary;
    }
    addr
}

impl DmaAllocator for HeapDmaAllocator {
    fn allocate(&self, size: usize, align: usize) -> AllocResult<DmaRegion> {
        if size == 0 || !align.is_power_of_two() {
            return Err(AllocError::InvalidLayout);
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| AllocError::InvalidLayout)?;

        let mut state = self.state.lock();
        if let Some(limit) = self.limit {
            if state.live_bytes + size > limit {
                return Err(AllocError::OutOfMemory);
            }
        }

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(AllocError::OutOfMemory);
        }

        let phys = place(state.next_phys, size, align);
        state.next_phys = phys + size as u64;
        state.live_bytes += size;
        state.live.insert(phys, (ptr as u64, layout));

        log_trace!(
            "heap DMA allocate phys={:#x} virt={:#x} size={}",
            phys,
            ptr as u64,
            size
        );
        Ok(DmaRegion {
            virt: ptr as u64,
            phys,
            size,
        })
    }

    unsafe fn free(&self, region: DmaRegion) {
        let mut state = self.state.lock();
        match state.live.remove(&region.phys) {
            Some((virt, layout)) => {
                debug_assert_eq!(virt, region.virt);
                state.live_bytes -= layout.size();
                dealloc(virt as *mut u8, layout);
            }
            None => panic!("heap DMA free of unknown region phys={:#x}", region.phys),
        }
    }
}
