//! Event ring: the controller produces, software drains.
//!
//! There is no link TRB. The controller learns the segment's base and length
//! from the single ERST entry stored right after the TRB slots, and wraps on
//! its own; software mirrors that by resetting `current` and flipping `ccs`.

use alloc::sync::Arc;
use core::sync::atomic::{fence, Ordering};

use super::RingMemory;
use crate::config::{validate_ring_trbs, ERST_ARRAY_SIZE, ERST_BYTES};
use crate::drivers::usb::xhci::error::XhciResult;
use crate::drivers::usb::xhci::trb::{self, ErstEntry, Trb, TrbFlags};
use crate::memory::dma::DmaContext;

/// One event ring segment and its ERST, owned by a single interrupter.
pub struct EventRing {
    memory: RingMemory,
    interrupter: u16,
    current: usize,
    ccs: bool,
}

impl EventRing {
    /// Allocate `count` event TRBs followed by the ERST in one buffer.
    pub fn init(ctx: &Arc<DmaContext>, interrupter: u16, count: usize) -> XhciResult<Self> {
        validate_ring_trbs(count, ERST_BYTES)?;
        let memory = RingMemory::allocate(ctx, count, ERST_BYTES)?;

        let entry = ErstEntry {
            base: memory.base_phys(),
            size: count as u32,
            reserved: 0,
        };
        unsafe { core::ptr::write_volatile(memory.trailer::<ErstEntry>(), entry) };

        log_debug!(
            "event ring {} init phys={:#x} slots={} erst={:#x}",
            interrupter,
            memory.base_phys(),
            count,
            memory.trailer_phys()
        );

        Ok(Self {
            memory,
            interrupter,
            current: 0,
            ccs: true,
        })
    }

    /// Yield every event the controller has finished writing.
    ///
    /// Stops at the first slot whose cycle bit does not match `ccs`. Dropping
    /// the iterator early leaves the remaining events for the next call.
    pub fn drain(&mut self) -> EventDrain<'_> {
        EventDrain { ring: self }
    }

    fn pop(&mut self) -> Option<Trb> {
        let slot = self.memory.slot(self.current);
        let control = unsafe { trb::read_control(slot) };
        if (control & TrbFlags::CYCLE.bits() != 0) != self.ccs {
            return None;
        }
        fence(Ordering::Acquire);
        let event = unsafe { trb::read_volatile(slot) };

        self.current += 1;
        if self.current == self.memory.slots() {
            self.current = 0;
            self.ccs = !self.ccs;
            log_trace!("event ring {} wrapped, ccs={}", self.interrupter, self.ccs as u8);
        }
        Some(event)
    }

    /// Interrupter this ring belongs to.
    pub fn interrupter(&self) -> u16 {
        self.interrupter
    }

    /// ERSTBA value for the interrupter register set.
    pub fn erst_phys(&self) -> u64 {
        self.memory.trailer_phys()
    }

    /// ERSTSZ value (number of segment table entries).
    pub fn erst_size(&self) -> u32 {
        ERST_ARRAY_SIZE as u32
    }

    /// The segment table entry as stored in ring memory.
    pub fn erst_entry(&self) -> ErstEntry {
        unsafe { core::ptr::read_volatile(self.memory.trailer::<ErstEntry>()) }
    }

    /// ERDP value to program after a drain.
    pub fn dequeue_phys(&self) -> u64 {
        self.memory.slot_phys(self.current)
    }

    /// Physical address of the first event slot.
    pub fn base_phys(&self) -> u64 {
        self.memory.base_phys()
    }

    /// Consumer cycle state expected at the next slot.
    pub fn ccs(&self) -> bool {
        self.ccs
    }

    /// Slot the next drain starts from.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Free the ring. The interrupter must already be disabled.
    pub fn release(self) {
        log_debug!(
            "event ring {} released phys={:#x}",
            self.interrupter,
            self.memory.base_phys()
        );
    }
}

/// Iterator returned by [`EventRing::drain`].
pub struct EventDrain<'a> {
    ring: &'a mut EventRing,
}

impl Iterator for EventDrain<'_> {
    type Item = Trb;

    fn next(&mut self) -> Option<Trb> {
        self.ring.pop()
    }
}
