//! Error taxonomy of the ring engine.
//!
//! `RingFull` is backpressure and belongs to the immediate caller. Memory and
//! hardware-contract failures are surfaced to the owning subsystem and never
//! retried here; the controller may need a reset first. Slot and endpoint
//! misuse are programming errors on the caller's side.

use core::fmt;

use crate::memory::AllocError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XhciError {
    /// Ring or buffer allocation failed.
    OutOfMemory,
    /// Not enough free TRB slots for the request.
    RingFull,
    /// A descriptor read back from hardware violates the ring contract.
    InvalidDescriptor { reason: &'static str },
    /// Slot id registered twice.
    DuplicateSlot(u8),
    /// Slot id not registered.
    UnknownSlot(u8),
    UnknownEndpoint { slot: u8, endpoint: u8 },
    EndpointExists { slot: u8, endpoint: u8 },
    /// Interrupter index outside the configured range.
    InvalidInterrupter(u16),
    /// Event ring already initialised for this interrupter.
    EventRingBusy(u16),
    /// Ring geometry rejected (TRB count).
    InvalidRingSize(usize),
    /// Request id is stale or was never issued.
    UnknownRequest,
}

impl XhciError {
    /// Whether the caller may retry the same operation later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RingFull | Self::OutOfMemory)
    }
}

impl fmt::Display for XhciError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of DMA memory for ring allocation"),
            Self::RingFull => write!(f, "transfer ring has no free slots"),
            Self::InvalidDescriptor { reason } => write!(f, "invalid descriptor: {}", reason),
            Self::DuplicateSlot(slot) => write!(f, "device slot {} already registered", slot),
            Self::UnknownSlot(slot) => write!(f, "device slot {} not registered", slot),
            Self::UnknownEndpoint { slot, endpoint } => {
                write!(f, "slot {} has no endpoint {}", slot, endpoint)
            }
            Self::EndpointExists { slot, endpoint } => {
                write!(f, "slot {} endpoint {} already configured", slot, endpoint)
            }
            Self::InvalidInterrupter(idx) => write!(f, "interrupter {} out of range", idx),
            Self::EventRingBusy(idx) => {
                write!(f, "interrupter {} already has an event ring", idx)
            }
            Self::InvalidRingSize(trbs) => write!(f, "invalid ring size of {} TRBs", trbs),
            Self::UnknownRequest => write!(f, "unknown transfer request"),
        }
    }
}

impl From<AllocError> for XhciError {
    fn from(_: AllocError) -> Self {
        Self::OutOfMemory
    }
}

pub type XhciResult<T> = Result<T, XhciError>;
