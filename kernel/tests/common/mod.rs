#![allow(dead_code)]

//! Device-side model of an xHCI controller for integration tests.
//!
//! The model touches ring memory only the way hardware would: through
//! physical addresses (resolved with the context's translator) and cycle
//! bits. It never looks at the engine's cursors.

use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use theseus_xhci::config::XhciConfig;
use theseus_xhci::drivers::usb::xhci::{
    CompletionCode, ErstEntry, HostCallbacks, TransferCompletion, Trb, TrbFlags, UsbSpeed,
    XhciController,
};
use theseus_xhci::memory::dma::DmaContext;
use theseus_xhci::memory::heap::HeapDmaAllocator;
use theseus_xhci::memory::translate::AddressTranslator;

pub const SLOT: u8 = 1;
pub const EP: u8 = 2;

pub fn context() -> Arc<DmaContext> {
    DmaContext::new(Arc::new(HeapDmaAllocator::new()))
}

fn read_trb(t: &AddressTranslator, phys: u64) -> Trb {
    let virt = t.phys_to_virt(phys);
    unsafe { std::ptr::read_volatile(virt as *const Trb) }
}

/// Consumer side of one transfer ring, as the controller walks it.
pub struct EndpointConsumer {
    dequeue: u64,
    ccs: bool,
    pub links_followed: usize,
}

impl EndpointConsumer {
    /// Start from a TR Dequeue Pointer (address | DCS).
    pub fn new(dequeue_pointer: u64) -> Self {
        Self {
            dequeue: dequeue_pointer & !0xF,
            ccs: dequeue_pointer & 1 != 0,
            links_followed: 0,
        }
    }

    /// Take up to `max` TRBs handed over by the producer, following links.
    pub fn fetch(&mut self, t: &AddressTranslator, max: usize) -> Vec<(u64, Trb)> {
        let mut out = Vec::new();
        while out.len() < max {
            let trb = read_trb(t, self.dequeue);
            if trb.cycle() != self.ccs {
                break;
            }
            fence(Ordering::Acquire);
            if trb.is_link() {
                if trb.flags().contains(TrbFlags::TOGGLE_CYCLE) {
                    self.ccs = !self.ccs;
                }
                self.dequeue = trb.ptr;
                self.links_followed += 1;
                continue;
            }
            out.push((self.dequeue, trb));
            self.dequeue += 16;
        }
        out
    }

    pub fn fetch_all(&mut self, t: &AddressTranslator) -> Vec<(u64, Trb)> {
        self.fetch(t, usize::MAX)
    }

    pub fn ccs(&self) -> bool {
        self.ccs
    }
}

/// Producer side of an event ring, located through its ERST.
pub struct EventProducer {
    base: u64,
    size: u32,
    enqueue: u32,
    pcs: bool,
}

impl EventProducer {
    pub fn new(t: &AddressTranslator, erst_phys: u64) -> Self {
        let virt = t.phys_to_virt(erst_phys);
        let entry = unsafe { std::ptr::read_volatile(virt as *const ErstEntry) };
        Self {
            base: entry.base,
            size: entry.size,
            enqueue: 0,
            pcs: true,
        }
    }

    pub fn post(&mut self, t: &AddressTranslator, event: Trb) {
        let mut event = event;
        event.set_cycle(self.pcs);
        let phys = self.base + self.enqueue as u64 * 16;
        let slot = t.phys_to_virt(phys) as *mut Trb;
        unsafe {
            std::ptr::write_volatile(std::ptr::addr_of_mut!((*slot).ptr), event.ptr);
            std::ptr::write_volatile(std::ptr::addr_of_mut!((*slot).status), event.status);
            fence(Ordering::Release);
            std::ptr::write_volatile(std::ptr::addr_of_mut!((*slot).control), event.control);
        }
        self.enqueue += 1;
        if self.enqueue == self.size {
            self.enqueue = 0;
            self.pcs = !self.pcs;
        }
    }
}

/// Callback sink recording everything the engine reports.
#[derive(Default)]
pub struct Recorder {
    pub completions: Vec<TransferCompletion>,
    pub ports: Vec<u8>,
    pub doorbells: Vec<(u8, u8)>,
    pub commands: Vec<Trb>,
    pub workers: usize,
}

impl HostCallbacks for Recorder {
    fn start_device_worker(&mut self) {
        self.workers += 1;
    }

    fn root_port_changed(&mut self, port: u8) {
        self.ports.push(port);
    }

    fn ring_doorbell(&mut self, slot: u8, endpoint: u8) {
        self.doorbells.push((slot, endpoint));
    }

    fn transfer_completed(&mut self, completion: TransferCompletion) {
        self.completions.push(completion);
    }

    fn command_completed(&mut self, event: &Trb) {
        self.commands.push(*event);
    }
}

/// Controller with one device, one configured endpoint and interrupter 0,
/// plus the device-side models wired to the same memory.
pub struct Harness {
    pub xhci: XhciController<Recorder>,
    pub consumer: EndpointConsumer,
    pub events: EventProducer,
}

impl Harness {
    pub fn new(transfer_ring_trbs: usize, event_ring_trbs: usize) -> Self {
        let config = XhciConfig {
            transfer_ring_trbs,
            event_ring_trbs,
            interrupters: 1,
        };
        let mut xhci = XhciController::new(context(), config, Recorder::default()).unwrap();
        let erst = xhci.init_event_ring(0).unwrap().erst_phys();
        xhci.add_device(SLOT, 0, 1, UsbSpeed::High).unwrap();
        let dequeue = xhci.configure_endpoint(SLOT, EP).unwrap();

        let events = EventProducer::new(xhci.dma().translator(), erst);
        Self {
            xhci,
            consumer: EndpointConsumer::new(dequeue),
            events,
        }
    }

    pub fn translator(&self) -> &AddressTranslator {
        self.xhci.dma().translator()
    }

    /// Let the device consume everything queued and report each IOC TRB.
    pub fn run_device(&mut self) -> Vec<(u64, Trb)> {
        let fetched = self.consumer.fetch_all(self.xhci.dma().translator());
        for &(phys, trb) in &fetched {
            if trb.flags().contains(TrbFlags::IOC) {
                let ev = Trb::transfer_event(phys, CompletionCode::Success, 0, SLOT, EP);
                self.events.post(self.xhci.dma().translator(), ev);
            }
        }
        fetched
    }

    pub fn completed_cookies(&self) -> Vec<u64> {
        self.xhci
            .callbacks()
            .completions
            .iter()
            .map(|c| c.cookie)
            .collect()
    }
}
