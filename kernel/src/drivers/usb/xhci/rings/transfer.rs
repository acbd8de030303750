//! Endpoint transfer ring: software produces, the controller consumes.
//!
//! The last slot holds a Link TRB back to the ring base with toggle-cycle
//! set, so `size` is one less than the slot count. `current` is the enqueue
//! position and `pcs` the cycle value the controller will accept there.
//! `dequeue` is the oldest slot the controller may still read; it carries its
//! own cycle state so a full ring (`current == dequeue`, one lap ahead) is
//! distinguishable from an empty one.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{fence, Ordering};

use super::{next_trb, read_trb_ptr, RingMemory};
use crate::config::validate_ring_trbs;
use crate::drivers::usb::xhci::error::{XhciError, XhciResult};
use crate::drivers::usb::xhci::request::{RequestArena, RequestId};
use crate::drivers::usb::xhci::trb::{self, Trb, TrbFlags};
use crate::memory::dma::DmaContext;

/// A request whose TRBs are on the ring and not yet completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTd {
    pub id: RequestId,
    /// Slot index of the first TRB.
    pub first: usize,
    pub trb_count: usize,
    /// Physical address of the last TRB, the one carrying IOC.
    pub last_phys: u64,
}

impl PendingTd {
    fn covers(&self, index: usize, size: usize) -> bool {
        (index + size - self.first) % size < self.trb_count
    }
}

/// Result of [`TransferRing::queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// TRBs written; the caller should ring the endpoint doorbell.
    Submitted,
    /// Parked on the deferred list until the ring can take it.
    Deferred,
}

/// Producer side of one endpoint's transfer ring, with the bookkeeping for
/// outstanding and deferred requests.
pub struct TransferRing {
    memory: RingMemory,
    current: usize,
    dequeue: usize,
    dequeue_cycle: bool,
    size: usize,
    pcs: bool,
    closed: bool,
    pending: VecDeque<PendingTd>,
    /// TDs that were on the ring when it was closed. A completion the
    /// controller posts for one of them after the close still retires it.
    stopped: VecDeque<PendingTd>,
    deferred: VecDeque<RequestId>,
}

impl TransferRing {
    /// Allocate a ring of `count` slots and install the link TRB.
    pub fn init(ctx: &Arc<DmaContext>, count: usize) -> XhciResult<Self> {
        validate_ring_trbs(count, 0)?;
        let memory = RingMemory::allocate(ctx, count, 0)?;
        let size = count - 1;

        let link = Trb::link(memory.base_phys());
        unsafe {
            trb::write_body(memory.slot(size), &link);
            trb::write_control(memory.slot(size), link.control);
        }

        log_debug!(
            "transfer ring init phys={:#x} slots={}",
            memory.base_phys(),
            count
        );

        Ok(Self {
            memory,
            current: 0,
            dequeue: 0,
            dequeue_cycle: true,
            size,
            pcs: true,
            closed: false,
            pending: VecDeque::new(),
            stopped: VecDeque::new(),
            deferred: VecDeque::new(),
        })
    }

    /// Slots occupied between `dequeue` and `current`.
    fn busy(&self) -> usize {
        use core::cmp::Ordering::*;
        match self.current.cmp(&self.dequeue) {
            Equal if self.pcs == self.dequeue_cycle => 0,
            Equal => self.size,
            Greater => self.current - self.dequeue,
            Less => self.current + self.size - self.dequeue,
        }
    }

    /// Slots the producer may still fill before reaching `dequeue`.
    pub fn free_slots(&self) -> usize {
        self.size - self.busy()
    }

    /// Write one descriptor at the enqueue position and advance.
    ///
    /// Returns the physical address the descriptor was written to.
    pub fn enqueue(&mut self, trb: &Trb) -> XhciResult<u64> {
        if self.free_slots() == 0 {
            return Err(XhciError::RingFull);
        }
        Ok(self.write_and_advance(trb))
    }

    fn write_and_advance(&mut self, trb: &Trb) -> u64 {
        let slot = self.memory.slot(self.current);
        let phys = self.memory.slot_phys(self.current);
        // Body goes in while the slot still reads as software-owned.
        let parked = (trb.control & !TrbFlags::CYCLE.bits()) | (!self.pcs) as u32;
        unsafe {
            trb::write_body(slot, trb);
            trb::write_control(slot, parked);
        }
        fence(Ordering::Release);
        self.advance();
        phys
    }

    /// Hand the slot at `current` to the controller and step forward,
    /// crossing the link TRB when it is reached.
    fn advance(&mut self) {
        let cycle = self.pcs as u32;
        let slot = self.memory.slot(self.current);
        let control = unsafe { trb::read_control(slot) };
        let chain = control & TrbFlags::CHAIN.bits();
        unsafe { trb::write_control(slot, (control & !TrbFlags::CYCLE.bits()) | cycle) };

        self.current += 1;
        let next = self.memory.read(self.current);
        if next.is_link() {
            let carried = TrbFlags::CHAIN.bits() | TrbFlags::CYCLE.bits();
            let control = (next.control & !carried) | chain | cycle;
            unsafe { trb::write_control(self.memory.slot(self.current), control) };

            if control & TrbFlags::TOGGLE_CYCLE.bits() != 0 {
                self.pcs = !self.pcs;
            }
            let target = read_trb_ptr(self.memory.translator(), &next);
            let size = self.size;
            self.current = match self.memory.index_of_virt(target).filter(|&i| i < size) {
                Some(index) => index,
                None => panic!("link TRB at {:#x} leaves its ring", next.ptr),
            };
            log_trace!(
                "transfer ring {:#x} wrapped, pcs={}",
                self.memory.base_phys(),
                self.pcs as u8
            );
        }
    }

    /// Write every TRB of request `id` and record it as pending.
    ///
    /// All or nothing: fails with `RingFull` without touching the ring if the
    /// request does not fit.
    pub fn submit(&mut self, id: RequestId, trbs: &[Trb]) -> XhciResult<()> {
        if trbs.is_empty() {
            return Err(XhciError::InvalidDescriptor {
                reason: "empty transfer descriptor",
            });
        }
        if trbs.len() > self.free_slots() {
            return Err(XhciError::RingFull);
        }
        let first = self.current;
        let mut last_phys = 0;
        for trb in trbs {
            last_phys = self.write_and_advance(trb);
        }
        self.pending.push_back(PendingTd {
            id,
            first,
            trb_count: trbs.len(),
            last_phys,
        });
        Ok(())
    }

    /// Submit, or defer when the ring is closed or already has deferred
    /// requests ahead of this one.
    pub fn queue(&mut self, id: RequestId, trbs: &[Trb]) -> XhciResult<QueueOutcome> {
        if trbs.len() > self.size {
            return Err(XhciError::InvalidDescriptor {
                reason: "transfer larger than ring",
            });
        }
        if self.closed || !self.deferred.is_empty() {
            self.deferred.push_back(id);
            log_trace!("transfer ring {:#x} deferred {:?}", self.memory.base_phys(), id);
            return Ok(QueueOutcome::Deferred);
        }
        self.submit(id, trbs)?;
        Ok(QueueOutcome::Submitted)
    }

    /// Move `dequeue` forward by `count` slots, as completion processing
    /// does when the controller reports progress.
    pub fn advance_dequeue(&mut self, count: usize) -> XhciResult<()> {
        if count > self.busy() {
            return Err(XhciError::InvalidDescriptor {
                reason: "dequeue moved past enqueue",
            });
        }
        for _ in 0..count {
            self.dequeue += 1;
            if self.dequeue == self.size {
                self.dequeue = 0;
                self.dequeue_cycle = !self.dequeue_cycle;
            }
        }
        Ok(())
    }

    /// Retire pending requests up to and including the one that owns the TRB
    /// at `phys`. Returns their ids in submission order; the last one is the
    /// request the event referred to.
    ///
    /// On a closed ring the match is made against the TDs that were
    /// outstanding at close time. Those are dropped from the deferred list
    /// instead of moving `dequeue`, which already sits at the enqueue slot.
    pub fn complete_through(&mut self, phys: u64) -> XhciResult<Vec<RequestId>> {
        let index = self
            .memory
            .index_of_phys(phys)
            .filter(|&i| i < self.size)
            .ok_or(XhciError::InvalidDescriptor {
                reason: "event TRB pointer outside transfer ring",
            })?;
        let size = self.size;
        let Some(pos) = self.pending.iter().position(|td| td.covers(index, size)) else {
            return self.complete_stopped(index);
        };

        let matched = self.pending[pos];
        let last = (matched.first + matched.trb_count - 1) % size;
        let after = unsafe { next_trb(self.memory.translator(), self.memory.slot(last)) };
        let end = self
            .memory
            .index_of_virt(after as u64)
            .ok_or(XhciError::InvalidDescriptor {
                reason: "link TRB leaves the transfer ring",
            })?;
        let steps = if end == self.dequeue {
            self.busy()
        } else {
            (end + size - self.dequeue) % size
        };
        self.advance_dequeue(steps)?;

        Ok(self.pending.drain(..=pos).map(|td| td.id).collect())
    }

    fn complete_stopped(&mut self, index: usize) -> XhciResult<Vec<RequestId>> {
        let size = self.size;
        let pos = self
            .stopped
            .iter()
            .position(|td| td.covers(index, size))
            .ok_or(XhciError::InvalidDescriptor {
                reason: "event TRB pointer matches no pending transfer",
            })?;
        let retired: Vec<RequestId> = self.stopped.drain(..=pos).map(|td| td.id).collect();
        self.deferred.retain(|id| !retired.contains(id));
        log_debug!(
            "transfer ring {:#x} retired {} stopped TDs after close",
            self.memory.base_phys(),
            retired.len()
        );
        Ok(retired)
    }

    /// Stop the ring: outstanding requests move, in order, ahead of anything
    /// already deferred. Returns how many were moved.
    pub fn close(&mut self) -> usize {
        let moved = self.pending.len();
        self.stopped.extend(self.pending.iter().copied());
        while let Some(td) = self.pending.pop_back() {
            self.deferred.push_front(td.id);
        }
        self.dequeue = self.current;
        self.dequeue_cycle = self.pcs;
        self.closed = true;
        log_debug!(
            "transfer ring {:#x} closed, {} outstanding deferred",
            self.memory.base_phys(),
            moved
        );
        moved
    }

    /// Accept submissions again. Deferred requests wait for
    /// [`TransferRing::replay_deferred`].
    pub fn reopen(&mut self) {
        self.closed = false;
        self.stopped.clear();
        log_debug!(
            "transfer ring {:#x} reopened at slot {}",
            self.memory.base_phys(),
            self.current
        );
    }

    /// Re-enqueue deferred requests from the head while whole requests fit.
    ///
    /// Ids that no longer resolve in `arena` were cancelled and are dropped.
    /// Returns the number of requests replayed.
    pub fn replay_deferred(&mut self, arena: &RequestArena) -> usize {
        if self.closed {
            return 0;
        }
        let mut replayed = 0;
        while let Some(&id) = self.deferred.front() {
            let Some(tracked) = arena.get(id) else {
                self.deferred.pop_front();
                continue;
            };
            let trbs = tracked.request.trbs();
            if trbs.len() > self.free_slots() {
                break;
            }
            self.deferred.pop_front();
            if self.submit(id, trbs).is_err() {
                self.deferred.push_front(id);
                break;
            }
            replayed += 1;
        }
        if replayed > 0 {
            log_debug!(
                "transfer ring {:#x} replayed {} deferred, {} remain",
                self.memory.base_phys(),
                replayed,
                self.deferred.len()
            );
        }
        replayed
    }

    /// Drop `id` from the deferred list. Returns whether it was there.
    pub fn cancel_deferred(&mut self, id: RequestId) -> bool {
        match self.deferred.iter().position(|&d| d == id) {
            Some(pos) => {
                self.deferred.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Empty the deferred list, handing the ids to the caller.
    pub fn take_deferred(&mut self) -> Vec<RequestId> {
        self.deferred.drain(..).collect()
    }

    /// TR Dequeue Pointer for the endpoint context: enqueue position with the
    /// dequeue cycle state in bit 0.
    pub fn dequeue_pointer(&self) -> u64 {
        self.memory.slot_phys(self.current) | self.pcs as u64
    }

    /// TDs on the ring awaiting a completion event, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PendingTd> + '_ {
        self.pending.iter()
    }

    /// Requests waiting to be written, in replay order.
    pub fn deferred(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.deferred.iter().copied()
    }

    /// Whether submissions are currently parked instead of written.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Usable slots (excluding the link TRB).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Producer cycle state: the cycle bit the next written slot will carry.
    pub fn pcs(&self) -> bool {
        self.pcs
    }

    /// Enqueue slot index.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Oldest slot the controller may still fetch.
    pub fn dequeue_index(&self) -> usize {
        self.dequeue
    }

    /// Physical address of slot 0, the link TRB's target.
    pub fn base_phys(&self) -> u64 {
        self.memory.base_phys()
    }

    /// Physical address of slot `index`. Panics past the link slot.
    pub fn slot_phys(&self, index: usize) -> u64 {
        self.memory.slot_phys(index)
    }

    /// Snapshot of slot `index`, link slot included.
    pub fn read_slot(&self, index: usize) -> Trb {
        self.memory.read(index)
    }

    /// Free the ring memory. The controller must no longer reference it.
    pub fn release(self) {
        log_debug!(
            "transfer ring {:#x} released ({} deferred dropped)",
            self.memory.base_phys(),
            self.deferred.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::usb::xhci::request::{TrackedRequest, TransferRequest};
    use crate::drivers::usb::xhci::trb::TrbType;
    use crate::memory::heap::HeapDmaAllocator;

    fn context() -> Arc<DmaContext> {
        DmaContext::new(Arc::new(HeapDmaAllocator::new()))
    }

    fn noop() -> Trb {
        Trb::new(TrbType::NoOp)
    }

    fn request(arena: &mut RequestArena, trbs: usize) -> RequestId {
        let request = TransferRequest::normal(0x8000_0000, trbs * crate::config::MAX_TRB_TRANSFER_LEN);
        assert_eq!(request.trbs().len(), trbs);
        arena.insert(TrackedRequest {
            request,
            slot: 1,
            endpoint: 1,
        })
    }

    fn submit(ring: &mut TransferRing, arena: &RequestArena, id: RequestId) -> XhciResult<QueueOutcome> {
        let trbs = arena.get(id).unwrap().request.trbs();
        ring.queue(id, trbs)
    }

    #[test]
    fn four_slot_ring_fills_and_frees() {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        assert_eq!(ring.size(), 3);
        assert_eq!(ring.free_slots(), 3);

        for _ in 0..3 {
            ring.enqueue(&noop()).unwrap();
        }
        assert_eq!(ring.free_slots(), 0);
        assert_eq!(ring.enqueue(&noop()), Err(XhciError::RingFull));
        assert_eq!(ring.free_slots(), 0);

        ring.advance_dequeue(1).unwrap();
        assert_eq!(ring.free_slots(), 1);
    }

    #[test]
    fn link_installed_at_last_slot() {
        let ctx = context();
        let ring = TransferRing::init(&ctx, 8).unwrap();
        let link = ring.read_slot(7);
        assert!(link.is_link());
        assert_eq!(link.ptr, ring.base_phys());
        assert!(link.flags().contains(TrbFlags::TOGGLE_CYCLE));
        assert!(!link.cycle());
        assert!(ring.pcs());
    }

    #[test]
    fn wrap_toggles_pcs_once_per_crossing() {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        for _ in 0..3 {
            ring.enqueue(&noop()).unwrap();
        }
        assert!(!ring.pcs());
        assert_eq!(ring.current_index(), 0);
        assert!(ring.read_slot(3).cycle());

        ring.advance_dequeue(3).unwrap();
        for _ in 0..3 {
            ring.enqueue(&noop()).unwrap();
        }
        assert!(ring.pcs());
        assert!(!ring.read_slot(3).cycle());
    }

    #[test]
    fn cycle_cleared_on_second_lap() {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        for _ in 0..3 {
            ring.enqueue(&noop()).unwrap();
        }
        ring.advance_dequeue(3).unwrap();
        ring.enqueue(&noop()).unwrap();
        assert!(!ring.read_slot(0).cycle());
        assert!(ring.read_slot(1).cycle());
    }

    #[test]
    fn chain_propagates_onto_link() {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        ring.enqueue(&noop()).unwrap();
        ring.enqueue(&noop()).unwrap();
        ring.enqueue(&Trb::normal(0x1000, 8, TrbFlags::CHAIN)).unwrap();
        assert!(ring.read_slot(3).chain());

        ring.advance_dequeue(3).unwrap();
        for _ in 0..3 {
            ring.enqueue(&noop()).unwrap();
        }
        assert!(!ring.read_slot(3).chain());
    }

    #[test]
    fn dequeue_pointer_carries_cycle() {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        assert_eq!(ring.dequeue_pointer(), ring.base_phys() | 1);
        ring.enqueue(&noop()).unwrap();
        assert_eq!(ring.dequeue_pointer(), ring.slot_phys(1) | 1);
    }

    #[test]
    fn completion_retires_in_order() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 8).unwrap();
        let a = request(&mut arena, 2);
        let b = request(&mut arena, 1);
        let c = request(&mut arena, 2);
        for id in [a, b, c] {
            assert_eq!(submit(&mut ring, &arena, id), Ok(QueueOutcome::Submitted));
        }
        assert_eq!(ring.free_slots(), 2);

        let b_last = ring.pending().nth(1).unwrap().last_phys;
        assert_eq!(ring.complete_through(b_last).unwrap(), alloc::vec![a, b]);
        assert_eq!(ring.free_slots(), 5);
        assert_eq!(ring.dequeue_index(), 3);

        assert!(matches!(
            ring.complete_through(b_last),
            Err(XhciError::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            ring.complete_through(0x10),
            Err(XhciError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn completion_across_wrap() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        let a = request(&mut arena, 2);
        submit(&mut ring, &arena, a).unwrap();
        ring.complete_through(ring.slot_phys(1)).unwrap();

        let b = request(&mut arena, 3);
        submit(&mut ring, &arena, b).unwrap();
        assert_eq!(ring.free_slots(), 0);
        assert_eq!(ring.complete_through(ring.slot_phys(1)).unwrap(), alloc::vec![b]);
        assert_eq!(ring.free_slots(), 3);
        assert_eq!(ring.dequeue_index(), ring.current_index());
    }

    #[test]
    fn close_and_reopen_replays_in_order() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 8).unwrap();
        let ids: Vec<_> = (0..3).map(|_| request(&mut arena, 1)).collect();
        for &id in &ids {
            submit(&mut ring, &arena, id).unwrap();
        }
        assert_eq!(ring.close(), 3);
        assert_eq!(ring.free_slots(), 7);

        let late = request(&mut arena, 1);
        assert_eq!(submit(&mut ring, &arena, late), Ok(QueueOutcome::Deferred));
        assert_eq!(ring.replay_deferred(&arena), 0);

        ring.reopen();
        assert_eq!(ring.replay_deferred(&arena), 4);
        let order: Vec<_> = ring.pending().map(|td| td.id).collect();
        assert_eq!(order, alloc::vec![ids[0], ids[1], ids[2], late]);
        assert_eq!(ring.deferred().count(), 0);
    }

    #[test]
    fn completion_after_close_retires_stopped_tds() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 8).unwrap();
        let ids: Vec<_> = (0..3).map(|_| request(&mut arena, 1)).collect();
        for &id in &ids {
            submit(&mut ring, &arena, id).unwrap();
        }
        let second = ring.pending().nth(1).unwrap().last_phys;
        let third = ring.pending().nth(2).unwrap().last_phys;
        assert_eq!(ring.close(), 3);
        let dequeue = ring.dequeue_index();

        assert_eq!(ring.complete_through(second).unwrap(), alloc::vec![ids[0], ids[1]]);
        assert_eq!(ring.deferred().collect::<Vec<_>>(), alloc::vec![ids[2]]);
        assert_eq!(ring.dequeue_index(), dequeue);
        assert_eq!(ring.free_slots(), 7);
        assert!(matches!(
            ring.complete_through(second),
            Err(XhciError::InvalidDescriptor { .. })
        ));

        // Once reopened, events for the old lap no longer match anything.
        ring.reopen();
        assert_eq!(ring.replay_deferred(&arena), 1);
        assert!(matches!(
            ring.complete_through(third),
            Err(XhciError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "leaves its ring")]
    fn link_outside_ring_is_fatal() {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        let other = TransferRing::init(&ctx, 4).unwrap();
        unsafe { trb::write_body(ring.memory.slot(3), &Trb::link(other.base_phys())) };
        for _ in 0..3 {
            ring.enqueue(&noop()).unwrap();
        }
    }

    #[test]
    fn replay_stops_at_first_request_that_does_not_fit() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 6).unwrap();
        let a = request(&mut arena, 2);
        let b = request(&mut arena, 3);
        let c = request(&mut arena, 1);
        ring.close();
        for id in [a, b, c] {
            submit(&mut ring, &arena, id).unwrap();
        }
        ring.reopen();
        for _ in 0..1 {
            ring.enqueue(&noop()).unwrap();
        }
        // 4 free: a fits, b (3) does not, c must wait behind b.
        assert_eq!(ring.replay_deferred(&arena), 1);
        assert_eq!(ring.deferred().collect::<Vec<_>>(), alloc::vec![b, c]);

        let d = request(&mut arena, 1);
        assert_eq!(submit(&mut ring, &arena, d), Ok(QueueOutcome::Deferred));
    }

    #[test]
    fn cancelled_requests_are_skipped() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        let a = request(&mut arena, 1);
        let b = request(&mut arena, 1);
        ring.close();
        submit(&mut ring, &arena, a).unwrap();
        submit(&mut ring, &arena, b).unwrap();
        arena.remove(a).unwrap();
        ring.reopen();
        assert_eq!(ring.replay_deferred(&arena), 1);
        assert_eq!(ring.pending().next().unwrap().id, b);
    }

    #[test]
    fn oversized_transfer_rejected() {
        let ctx = context();
        let mut arena = RequestArena::new();
        let mut ring = TransferRing::init(&ctx, 4).unwrap();
        let big = request(&mut arena, 4);
        assert!(matches!(
            submit(&mut ring, &arena, big),
            Err(XhciError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn init_rejects_tiny_rings() {
        let ctx = context();
        assert_eq!(
            TransferRing::init(&ctx, 1).err(),
            Some(XhciError::InvalidRingSize(1))
        );
    }

    #[test]
    fn init_reports_out_of_memory() {
        let ctx = DmaContext::new(Arc::new(HeapDmaAllocator::with_capacity(32)));
        assert_eq!(
            TransferRing::init(&ctx, 4).err(),
            Some(XhciError::OutOfMemory)
        );
    }
}
