//! xHCI host controller ring engine.
//!
//! [`XhciController`] is the per-controller context every ring and slot
//! operation goes through. It owns the event ring of each interrupter, the
//! device slots with their endpoint transfer rings, and the arena of in-flight
//! requests. Everything outside the rings (register programming, doorbells,
//! worker threads, hub logic) is reached through [`HostCallbacks`].
//!
//! Control flow: [`XhciController::queue_transfer`] writes a request's TRBs
//! onto its endpoint ring and asks the host to ring the doorbell. The
//! controller later posts a Transfer Event; the platform IRQ path calls
//! [`XhciController::on_interrupt`], which drains the event ring, matches each
//! completion back to the pending request, hands it to
//! [`HostCallbacks::transfer_completed`], and finally replays deferred
//! requests on rings that have room again.

pub mod devices;
pub mod error;
pub mod request;
pub mod rings;
pub mod trb;

use alloc::sync::Arc;
use alloc::vec::Vec;

pub use devices::{DeviceManager, DeviceSlot, UsbSpeed};
pub use error::{XhciError, XhciResult};
pub use request::{RequestArena, RequestId, TrackedRequest, TransferRequest};
pub use rings::{EventRing, QueueOutcome, TransferRing};
pub use trb::{CompletionCode, ErstEntry, Trb, TrbFlags, TrbType};

use crate::config::XhciConfig;
use crate::memory::dma::DmaContext;

/// Highest Device Context Index an endpoint ring can be attached to.
const MAX_ENDPOINT_ID: u8 = 31;

/// A finished transfer, handed back to the submitter.
#[derive(Debug)]
pub struct TransferCompletion {
    pub request: RequestId,
    pub slot: u8,
    pub endpoint: u8,
    pub code: CompletionCode,
    /// Bytes not transferred, as reported by the controller.
    pub residual: u32,
    pub cookie: u64,
    pub transfer: TransferRequest,
}

/// Boundary into the rest of the host stack.
///
/// Every method has a no-op default so embedders only implement what they
/// wire up.
pub trait HostCallbacks {
    /// Start the per-controller device worker. Called at most once.
    fn start_device_worker(&mut self) {}

    /// Root-hub port `port` (1-based) reported a status change.
    fn root_port_changed(&mut self, _port: u8) {}

    /// New TRBs are on the ring of `endpoint`; ring its doorbell.
    fn ring_doorbell(&mut self, _slot: u8, _endpoint: u8) {}

    fn transfer_completed(&mut self, _completion: TransferCompletion) {}

    /// Command Completion Event for the command ring owner.
    fn command_completed(&mut self, _event: &Trb) {}
}

impl HostCallbacks for () {}

pub struct XhciController<C: HostCallbacks> {
    dma: Arc<DmaContext>,
    config: XhciConfig,
    event_rings: Vec<Option<EventRing>>,
    devices: DeviceManager,
    requests: RequestArena,
    callbacks: C,
    worker_started: bool,
}

impl<C: HostCallbacks> XhciController<C> {
    pub fn new(dma: Arc<DmaContext>, config: XhciConfig, callbacks: C) -> XhciResult<Self> {
        crate::logging::init();
        config.validate()?;

        let event_rings = (0..config.interrupters).map(|_| None).collect();
        log_info!(
            "xHCI ring engine ready: {} interrupters, transfer rings {} TRBs, event rings {} TRBs",
            config.interrupters,
            config.transfer_ring_trbs,
            config.event_ring_trbs
        );

        Ok(Self {
            dma,
            config,
            event_rings,
            devices: DeviceManager::new(),
            requests: RequestArena::new(),
            callbacks,
            worker_started: false,
        })
    }

    /// Allocate the event ring and ERST for `interrupter`.
    ///
    /// The returned ring's `erst_phys`, `erst_size` and `dequeue_phys` are
    /// what the register layer programs into the interrupter.
    pub fn init_event_ring(&mut self, interrupter: u16) -> XhciResult<&EventRing> {
        let count = self.config.event_ring_trbs;
        let entry = self
            .event_rings
            .get_mut(interrupter as usize)
            .ok_or(XhciError::InvalidInterrupter(interrupter))?;
        if entry.is_some() {
            return Err(XhciError::EventRingBusy(interrupter));
        }
        let ring = EventRing::init(&self.dma, interrupter, count)?;
        Ok(entry.insert(ring))
    }

    /// Free the event ring of a disabled interrupter.
    pub fn release_event_ring(&mut self, interrupter: u16) -> XhciResult<()> {
        let ring = self
            .event_rings
            .get_mut(interrupter as usize)
            .and_then(Option::take)
            .ok_or(XhciError::InvalidInterrupter(interrupter))?;
        ring.release();
        Ok(())
    }

    /// The initialized event ring of `interrupter`.
    pub fn event_ring(&self, interrupter: u16) -> XhciResult<&EventRing> {
        self.event_rings
            .get(interrupter as usize)
            .and_then(Option::as_ref)
            .ok_or(XhciError::InvalidInterrupter(interrupter))
    }

    /// Register a newly enabled device slot.
    pub fn add_device(&mut self, slot: u8, hub_address: u8, port: u8, speed: UsbSpeed) -> XhciResult<()> {
        self.devices.add_device(slot, hub_address, port, speed)
    }

    /// Detach `slot`. Outstanding requests are deferred on its closed rings;
    /// hand the slot to [`XhciController::release_device`] once the
    /// controller has disabled it.
    ///
    /// Events already posted on any interrupter are dispatched first, so
    /// transfers that finished before the detach complete normally.
    pub fn remove_device(&mut self, slot: u8) -> XhciResult<DeviceSlot> {
        self.devices.get(slot)?;
        if let Some(err) = self.drain_all_events() {
            log_warn!("slot {} removed after event error: {}", slot, err);
        }
        self.devices.remove_device(slot)
    }

    /// Free a detached slot's rings and return the requests that never ran.
    pub fn release_device(&mut self, mut slot: DeviceSlot) -> Vec<TransferRequest> {
        let mut orphaned = Vec::new();
        for (_, ring) in slot.endpoints_mut() {
            orphaned.extend(
                ring.take_deferred()
                    .into_iter()
                    .filter_map(|id| self.requests.remove(id).ok())
                    .map(|tracked| tracked.request),
            );
        }
        if !orphaned.is_empty() {
            log_warn!(
                "slot {} released with {} unfinished requests",
                slot.slot_id,
                orphaned.len()
            );
        }
        slot.release();
        orphaned
    }

    /// Create the transfer ring for `endpoint` (DCI 1..=31) and return the TR
    /// Dequeue Pointer for its endpoint context.
    pub fn configure_endpoint(&mut self, slot: u8, endpoint: u8) -> XhciResult<u64> {
        if endpoint == 0 || endpoint > MAX_ENDPOINT_ID {
            return Err(XhciError::UnknownEndpoint { slot, endpoint });
        }
        let device = self.devices.get_mut(slot)?;
        if device.endpoint(endpoint).is_some() {
            return Err(XhciError::EndpointExists { slot, endpoint });
        }
        let ring = TransferRing::init(&self.dma, self.config.transfer_ring_trbs)?;
        let dequeue = ring.dequeue_pointer();
        device.insert_endpoint(endpoint, ring)?;
        log_debug!("slot {} endpoint {} ring at {:#x}", slot, endpoint, dequeue);
        Ok(dequeue)
    }

    /// Endpoint halted or being reset: stop submitting and defer what was
    /// outstanding. Returns the number of requests deferred.
    ///
    /// Posted events are dispatched before the ring closes, so a transfer
    /// the controller already completed is reported once and never replayed.
    /// A completion that arrives after the close still retires its request.
    /// Event errors seen during that drain are logged; the close goes ahead.
    pub fn close_endpoint(&mut self, slot: u8, endpoint: u8) -> XhciResult<usize> {
        self.devices.ring_mut(slot, endpoint)?;
        if let Some(err) = self.drain_all_events() {
            log_warn!("slot {} ep {} closing after event error: {}", slot, endpoint, err);
        }
        Ok(self.devices.ring_mut(slot, endpoint)?.close())
    }

    /// Resume a closed endpoint and replay its deferred requests.
    ///
    /// Returns the TR Dequeue Pointer to program with Set TR Dequeue Pointer
    /// (the position replay starts from) and the number replayed.
    pub fn reopen_endpoint(&mut self, slot: u8, endpoint: u8) -> XhciResult<(u64, usize)> {
        let ring = self.devices.ring_mut(slot, endpoint)?;
        ring.reopen();
        let dequeue = ring.dequeue_pointer();
        let replayed = ring.replay_deferred(&self.requests);
        if replayed > 0 {
            self.callbacks.ring_doorbell(slot, endpoint);
        }
        Ok((dequeue, replayed))
    }

    /// Tear down one endpoint ring. The controller must have stopped the
    /// endpoint. Returns requests that were still deferred.
    pub fn drop_endpoint(&mut self, slot: u8, endpoint: u8) -> XhciResult<Vec<TransferRequest>> {
        let mut ring = self
            .devices
            .get_mut(slot)?
            .take_endpoint(endpoint)
            .ok_or(XhciError::UnknownEndpoint { slot, endpoint })?;
        ring.close();
        let orphaned = ring
            .take_deferred()
            .into_iter()
            .filter_map(|id| self.requests.remove(id).ok())
            .map(|tracked| tracked.request)
            .collect();
        ring.release();
        Ok(orphaned)
    }

    /// Queue `request` on `endpoint` of `slot`.
    ///
    /// `RingFull` is backpressure: the request is dropped and the caller
    /// resubmits once completions free space.
    pub fn queue_transfer(
        &mut self,
        slot: u8,
        endpoint: u8,
        request: TransferRequest,
    ) -> XhciResult<(RequestId, QueueOutcome)> {
        let ring = self.devices.ring_mut(slot, endpoint)?;
        let id = self.requests.insert(TrackedRequest {
            request,
            slot,
            endpoint,
        });
        let outcome = match self.requests.get(id) {
            Some(tracked) => ring.queue(id, tracked.request.trbs()),
            None => Err(XhciError::UnknownRequest),
        };
        match outcome {
            Ok(outcome) => {
                if outcome == QueueOutcome::Submitted {
                    self.callbacks.ring_doorbell(slot, endpoint);
                }
                log_trace!("slot {} ep {} queued {:?}: {:?}", slot, endpoint, id, outcome);
                Ok((id, outcome))
            }
            Err(err) => {
                let _ = self.requests.remove(id);
                Err(err)
            }
        }
    }

    /// Withdraw a request that is still deferred.
    pub fn cancel_deferred(&mut self, id: RequestId) -> XhciResult<TransferRequest> {
        let (slot, endpoint) = match self.requests.get(id) {
            Some(tracked) => (tracked.slot, tracked.endpoint),
            None => return Err(XhciError::UnknownRequest),
        };
        if !self.devices.ring_mut(slot, endpoint)?.cancel_deferred(id) {
            return Err(XhciError::UnknownRequest);
        }
        Ok(self.requests.remove(id)?.request)
    }

    /// Interrupt entry point for `interrupter`.
    ///
    /// Drains every event the controller has posted, then replays deferred
    /// requests. Events that violate the ring contract are logged and
    /// skipped so the ring keeps moving; the first such error is returned
    /// after the drain. On success returns the number of events consumed.
    pub fn on_interrupt(&mut self, interrupter: u16) -> XhciResult<usize> {
        let (consumed, first_error) = self.drain_events(interrupter)?;
        self.replay_deferred();

        match first_error {
            Some(err) => Err(err),
            None => Ok(consumed),
        }
    }

    /// Dispatch everything posted on `interrupter` without replaying.
    /// Returns the event count and the first dispatch error.
    fn drain_events(&mut self, interrupter: u16) -> XhciResult<(usize, Option<XhciError>)> {
        let ring = self
            .event_rings
            .get_mut(interrupter as usize)
            .and_then(Option::as_mut)
            .ok_or(XhciError::InvalidInterrupter(interrupter))?;

        let mut consumed = 0;
        let mut first_error = None;
        for event in ring.drain() {
            consumed += 1;
            if let Err(err) =
                Self::dispatch_event(&mut self.devices, &mut self.requests, &mut self.callbacks, &event)
            {
                log_error!(
                    "interrupter {} event type {} ptr={:#x}: {}",
                    interrupter,
                    event.raw_type(),
                    event.ptr,
                    err
                );
                first_error.get_or_insert(err);
            }
        }
        log_trace!("interrupter {} drained {} events", interrupter, consumed);
        Ok((consumed, first_error))
    }

    fn drain_all_events(&mut self) -> Option<XhciError> {
        let mut first_error = None;
        for interrupter in 0..self.event_rings.len() {
            if let Ok((_, Some(err))) = self.drain_events(interrupter as u16) {
                first_error.get_or_insert(err);
            }
        }
        first_error
    }

    fn dispatch_event(
        devices: &mut DeviceManager,
        requests: &mut RequestArena,
        callbacks: &mut C,
        event: &Trb,
    ) -> XhciResult<()> {
        match event.trb_type() {
            Some(TrbType::TransferEvent) => {
                Self::complete_transfer(devices, requests, callbacks, event)
            }
            Some(TrbType::CommandCompletionEvent) => {
                callbacks.command_completed(event);
                Ok(())
            }
            Some(TrbType::PortStatusChangeEvent) => match event.port_id() {
                Some(port) => {
                    log_debug!("root port {} changed", port);
                    callbacks.root_port_changed(port);
                    Ok(())
                }
                None => Err(XhciError::InvalidDescriptor {
                    reason: "port status change without port id",
                }),
            },
            Some(other) if other.is_event() => {
                log_debug!("ignoring {:?}", other);
                Ok(())
            }
            _ => Err(XhciError::InvalidDescriptor {
                reason: "non-event TRB on event ring",
            }),
        }
    }

    fn complete_transfer(
        devices: &mut DeviceManager,
        requests: &mut RequestArena,
        callbacks: &mut C,
        event: &Trb,
    ) -> XhciResult<()> {
        let slot = event.slot_id();
        let endpoint = event.endpoint_id();
        let code = event.completion_code();
        if code.is_stopped() {
            // The TD stays with the ring; close or reopen decides its fate.
            log_debug!("slot {} ep {} stopped at {:#x}: {:?}", slot, endpoint, event.ptr, code);
            return Ok(());
        }
        let ring = devices
            .ring_mut(slot, endpoint)
            .map_err(|_| XhciError::InvalidDescriptor {
                reason: "transfer event for unconfigured endpoint",
            })?;

        let retired = ring.complete_through(event.ptr)?;
        let last = retired.len().saturating_sub(1);
        for (i, id) in retired.into_iter().enumerate() {
            let Ok(tracked) = requests.remove(id) else {
                continue;
            };
            let (code, residual) = if i == last {
                (code, event.transfer_len())
            } else {
                (CompletionCode::Success, 0)
            };
            if !code.is_ok() {
                log_warn!("slot {} ep {} transfer failed: {:?}", slot, endpoint, code);
            }
            callbacks.transfer_completed(TransferCompletion {
                request: id,
                slot,
                endpoint,
                code,
                residual,
                cookie: tracked.request.cookie(),
                transfer: tracked.request,
            });
        }
        Ok(())
    }

    /// Give every open ring with deferred requests a chance to take them.
    fn replay_deferred(&mut self) {
        for device in self.devices.iter_mut() {
            let slot = device.slot_id;
            for (endpoint, ring) in device.endpoints_mut() {
                if ring.replay_deferred(&self.requests) > 0 {
                    self.callbacks.ring_doorbell(slot, endpoint);
                }
            }
        }
    }

    /// Start the external device worker. Only the first call has an effect;
    /// returns whether this call started it.
    pub fn dispatch_device_work(&mut self) -> bool {
        if self.worker_started {
            return false;
        }
        self.worker_started = true;
        log_info!("starting xHCI device worker");
        self.callbacks.start_device_worker();
        true
    }

    /// Forward a root-hub port change detected outside the event ring
    /// (e.g. by polling PORTSC).
    pub fn on_root_port_changed(&mut self, port: u8) {
        log_debug!("root port {} changed", port);
        self.callbacks.root_port_changed(port);
    }

    /// Device slots known to the controller.
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// Transfer ring of `endpoint` on `slot`, for inspection.
    pub fn ring(&self, slot: u8, endpoint: u8) -> XhciResult<&TransferRing> {
        self.devices
            .get(slot)?
            .endpoint(endpoint)
            .ok_or(XhciError::UnknownEndpoint { slot, endpoint })
    }

    /// Requests submitted and not yet completed, cancelled or orphaned.
    pub fn requests(&self) -> &RequestArena {
        &self.requests
    }

    /// The host stack boundary this controller reports to.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    /// Mutable access to the callbacks, for embedders that keep state there.
    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// DMA context every ring of this controller is allocated from.
    pub fn dma(&self) -> &Arc<DmaContext> {
        &self.dma
    }

    /// Ring sizes and interrupter count this controller was built with.
    pub fn config(&self) -> &XhciConfig {
        &self.config
    }
}
