//! TRB rings shared between the driver and the controller.
//!
//! [`TransferRing`] is produced by software and consumed by the device,
//! [`EventRing`] the other way round. Both sit on a [`RingMemory`]: a pinned
//! DMA buffer viewed as an array of TRB slots with bounds-checked access.
//! Ownership of each slot is decided only by its cycle bit, so every write
//! that hands a slot over is ordered after the rest of the descriptor.

mod event;
mod transfer;

pub use event::{EventDrain, EventRing};
pub use transfer::{PendingTd, QueueOutcome, TransferRing};

use alloc::sync::Arc;

use super::trb::{self, Trb};
use crate::config::{RING_ALIGNMENT, TRB_SIZE};
use crate::memory::dma::{DmaBuffer, DmaContext};
use crate::memory::translate::AddressTranslator;
use crate::memory::AllocResult;

/// Pinned ring memory: `slots` TRBs, optionally followed by trailing bytes.
pub(crate) struct RingMemory {
    buffer: DmaBuffer,
    slots: usize,
}

impl RingMemory {
    /// Allocate zeroed memory for `slots` TRBs plus `trailer` bytes.
    pub(crate) fn allocate(ctx: &Arc<DmaContext>, slots: usize, trailer: usize) -> AllocResult<Self> {
        let buffer = DmaBuffer::allocate(ctx, slots * TRB_SIZE + trailer, RING_ALIGNMENT)?;
        Ok(Self { buffer, slots })
    }

    pub(crate) fn slots(&self) -> usize {
        self.slots
    }

    pub(crate) fn base_phys(&self) -> u64 {
        self.buffer.phys_addr()
    }

    /// Pointer to slot `index`. Panics when out of range.
    pub(crate) fn slot(&self, index: usize) -> *mut Trb {
        assert!(index < self.slots, "TRB slot {} outside ring of {}", index, self.slots);
        self.buffer.ptr_at::<Trb>(index * TRB_SIZE)
    }

    pub(crate) fn slot_phys(&self, index: usize) -> u64 {
        assert!(index < self.slots, "TRB slot {} outside ring of {}", index, self.slots);
        self.base_phys() + (index * TRB_SIZE) as u64
    }

    pub(crate) fn translator(&self) -> &AddressTranslator {
        self.buffer.context().translator()
    }

    /// Slot index for a virtual address, if it names a slot of this ring.
    pub(crate) fn index_of_virt(&self, virt: u64) -> Option<usize> {
        let offset = virt.checked_sub(self.buffer.virt_addr())?;
        if offset % TRB_SIZE as u64 != 0 {
            return None;
        }
        let index = (offset / TRB_SIZE as u64) as usize;
        (index < self.slots).then_some(index)
    }

    /// Slot index for a physical address reported by the controller.
    ///
    /// The address must first resolve through the translator; anything
    /// outside owned DMA memory, or owned by another buffer, yields `None`.
    pub(crate) fn index_of_phys(&self, phys: u64) -> Option<usize> {
        let virt = self.translator().try_phys_to_virt(phys)?;
        self.index_of_virt(virt)
    }

    /// Pointer to the trailer area that follows the slots.
    pub(crate) fn trailer<T>(&self) -> *mut T {
        self.buffer.ptr_at::<T>(self.slots * TRB_SIZE)
    }

    pub(crate) fn trailer_phys(&self) -> u64 {
        self.base_phys() + (self.slots * TRB_SIZE) as u64
    }

    pub(crate) fn read(&self, index: usize) -> Trb {
        unsafe { trb::read_volatile(self.slot(index)) }
    }
}

/// Virtual address of the memory a descriptor's pointer field names.
///
/// Panics if the pointer is outside memory owned through `translator`.
pub fn read_trb_ptr(translator: &AddressTranslator, trb: &Trb) -> u64 {
    translator.phys_to_virt(trb.ptr)
}

/// The descriptor after `slot`, following a Link TRB if one sits there.
///
/// # Safety
///
/// `slot` must be a non-link TRB of a ring whose memory is registered with
/// `translator`; the slot after it is therefore still inside the ring.
pub unsafe fn next_trb(translator: &AddressTranslator, slot: *const Trb) -> *const Trb {
    let next = slot.add(1);
    let candidate = trb::read_volatile(next);
    if candidate.is_link() {
        read_trb_ptr(translator, &candidate) as *const Trb
    } else {
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::heap::HeapDmaAllocator;

    fn context() -> Arc<DmaContext> {
        DmaContext::new(Arc::new(HeapDmaAllocator::new()))
    }

    #[test]
    fn slot_addresses_are_consistent() {
        let ctx = context();
        let mem = RingMemory::allocate(&ctx, 8, 16).unwrap();
        assert_eq!(mem.slot_phys(3), mem.base_phys() + 48);
        assert_eq!(mem.index_of_phys(mem.slot_phys(5)), Some(5));
        assert_eq!(mem.index_of_phys(mem.base_phys() + 8), None);
        assert_eq!(mem.index_of_phys(mem.trailer_phys()), None);
        assert_eq!(mem.index_of_virt(mem.slot(6) as u64), Some(6));
        assert_eq!(
            ctx.translator().phys_to_virt(mem.slot_phys(2)),
            mem.slot(2) as u64
        );
    }

    #[test]
    #[should_panic(expected = "outside ring")]
    fn slot_access_is_bounds_checked() {
        let ctx = context();
        let mem = RingMemory::allocate(&ctx, 4, 0).unwrap();
        let _ = mem.slot(4);
    }

    #[test]
    fn next_trb_follows_links() {
        let ctx = context();
        let mem = RingMemory::allocate(&ctx, 4, 0).unwrap();
        unsafe {
            let link = Trb::link(mem.base_phys());
            trb::write_body(mem.slot(3), &link);
            trb::write_control(mem.slot(3), link.control);

            let t = ctx.translator();
            assert_eq!(next_trb(t, mem.slot(0)), mem.slot(1) as *const Trb);
            assert_eq!(next_trb(t, mem.slot(2)), mem.slot(0) as *const Trb);
        }
    }

    #[test]
    fn foreign_addresses_map_to_no_slot() {
        let ctx = context();
        let mem = RingMemory::allocate(&ctx, 4, 0).unwrap();
        let other = RingMemory::allocate(&ctx, 4, 0).unwrap();
        // Owned by the same translator, but another ring.
        assert_eq!(mem.index_of_phys(other.slot_phys(1)), None);
        // Not owned at all, or a virtual address passed as physical.
        assert_eq!(mem.index_of_phys(0x10), None);
        assert_eq!(mem.index_of_phys(mem.slot(1) as u64), None);
        assert_eq!(mem.index_of_phys(u64::MAX & !0xF), None);
    }

    #[test]
    fn read_trb_ptr_translates_pointer_field() {
        let ctx = context();
        let mem = RingMemory::allocate(&ctx, 2, 0).unwrap();
        let trb = Trb::link(mem.slot_phys(1));
        assert_eq!(read_trb_ptr(ctx.translator(), &trb), mem.slot(1) as u64);
    }
}
