use std::collections::VecDeque;

use proptest::prelude::*;
use theseus_xhci::drivers::usb::xhci::{
    RequestArena, TrackedRequest, TransferRequest, TransferRing, Trb, TrbFlags, XhciError,
};

mod common;

use common::{context, EndpointConsumer};

#[derive(Debug, Clone)]
enum Op {
    Submit(usize),
    Fetch,
    Complete,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..=4).prop_map(Op::Submit),
        1 => Just(Op::Fetch),
        2 => Just(Op::Complete),
    ]
}

/// Request of `count` Normal TRBs whose buffer fields carry sequence tags.
fn tagged(first_tag: u64, count: usize) -> TransferRequest {
    let trbs = (0..count as u64)
        .map(|i| Trb::normal(first_tag + i, 0, TrbFlags::empty()))
        .collect();
    TransferRequest::from_trbs(trbs).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn device_sees_every_trb_once_in_order(
        slots in 2usize..=12,
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let ctx = context();
        let t = ctx.translator();
        let mut ring = TransferRing::init(&ctx, slots).unwrap();
        let mut device = EndpointConsumer::new(ring.dequeue_pointer());
        let mut arena = RequestArena::new();

        let mut next_tag = 0u64;
        let mut unfetched: VecDeque<u64> = VecDeque::new();
        let mut outstanding = 0usize;

        for op in ops {
            match op {
                Op::Submit(count) => {
                    let free = ring.free_slots();
                    let request = tagged(next_tag, count);
                    let id = arena.insert(TrackedRequest { request, slot: 1, endpoint: 1 });
                    let trbs = arena.get(id).unwrap().request.trbs().to_vec();
                    match ring.submit(id, &trbs) {
                        Ok(()) => {
                            prop_assert!(count <= free);
                            unfetched.extend(next_tag..next_tag + count as u64);
                            next_tag += count as u64;
                            outstanding += count;
                        }
                        Err(err) => {
                            prop_assert_eq!(err, XhciError::RingFull);
                            prop_assert!(count > free);
                            prop_assert_eq!(ring.free_slots(), free);
                            arena.remove(id).unwrap();
                        }
                    }
                }
                Op::Fetch => {
                    for (_, trb) in device.fetch_all(t) {
                        prop_assert_eq!(Some(trb.ptr), unfetched.pop_front());
                    }
                    prop_assert!(unfetched.is_empty());
                }
                Op::Complete => {
                    for (_, trb) in device.fetch_all(t) {
                        prop_assert_eq!(Some(trb.ptr), unfetched.pop_front());
                    }
                    let Some(td) = ring.pending().next().copied() else {
                        continue;
                    };
                    let retired = ring.complete_through(td.last_phys).unwrap();
                    prop_assert_eq!(retired, vec![td.id]);
                    arena.remove(td.id).unwrap();
                    outstanding -= td.trb_count;
                }
            }

            prop_assert_eq!(ring.free_slots(), ring.size() - outstanding);
            if unfetched.is_empty() {
                prop_assert_eq!(device.ccs(), ring.pcs());
            }
        }
    }

    #[test]
    fn written_slots_carry_lap_parity(
        slots in 2usize..=12,
        bursts in prop::collection::vec(1usize..=11, 1..40),
    ) {
        let ctx = context();
        let mut ring = TransferRing::init(&ctx, slots).unwrap();

        for burst in bursts {
            let burst = burst.min(ring.free_slots());
            for i in 0..burst {
                ring.enqueue(&Trb::normal(i as u64, 0, TrbFlags::empty())).unwrap();
            }

            let mut index = ring.dequeue_index();
            let busy = ring.size() - ring.free_slots();
            // Slots before the enqueue position on this lap carry pcs; older
            // ones were written on the previous lap.
            let mut cycle = if busy > 0 && index >= ring.current_index() {
                !ring.pcs()
            } else {
                ring.pcs()
            };
            for _ in 0..busy {
                prop_assert_eq!(ring.read_slot(index).cycle(), cycle);
                index += 1;
                if index == ring.size() {
                    index = 0;
                    cycle = !cycle;
                }
            }
            // The enqueue slot is never owned by the controller.
            if ring.free_slots() > 0 {
                prop_assert_ne!(ring.read_slot(ring.current_index()).cycle(), ring.pcs());
            }
            let link = ring.read_slot(ring.size());
            prop_assert!(link.is_link());
            prop_assert!(link.flags().contains(TrbFlags::TOGGLE_CYCLE));

            ring.advance_dequeue(busy / 2 + busy % 2).unwrap();
        }
    }
}
