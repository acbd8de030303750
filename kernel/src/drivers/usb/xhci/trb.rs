//! TRB encodings and helpers for the xHCI ring engine.
//!
//! A TRB is 16 bytes: a 64-bit parameter (usually a pointer), a 32-bit status
//! dword and a 32-bit control dword. Ring traversal works on the named
//! accessors below; the raw dwords are only touched here and at the volatile
//! slot I/O boundary.

use bitflags::bitflags;
use core::ptr::{addr_of, addr_of_mut};

use crate::config::TRB_SIZE;

const TRB_TYPE_SHIFT: u32 = 10;
const TRB_TYPE_MASK: u32 = 0x3F << TRB_TYPE_SHIFT;
const TRB_ENDPOINT_SHIFT: u32 = 16;
const TRB_ENDPOINT_MASK: u32 = 0x1F << TRB_ENDPOINT_SHIFT;
const TRB_SLOT_SHIFT: u32 = 24;
const TRB_COMPLETION_SHIFT: u32 = 24;
const TRB_TRANSFER_LEN_MASK: u32 = 0x00FF_FFFF;
const TRB_PORT_ID_SHIFT: u32 = 24;

bitflags! {
    /// Flag bits of the control dword shared by transfer-ring TRB types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrbFlags: u32 {
        /// Ownership bit.
        const CYCLE = 1 << 0;
        /// Link TRB: flip the consumer cycle state when following this link.
        const TOGGLE_CYCLE = 1 << 1;
        /// Interrupt on short packet.
        const ISP = 1 << 2;
        const NO_SNOOP = 1 << 3;
        /// Next TRB belongs to the same transfer descriptor.
        const CHAIN = 1 << 4;
        /// Interrupt on completion.
        const IOC = 1 << 5;
        /// Parameter field holds immediate data.
        const IDT = 1 << 6;
        /// Block event interrupt.
        const BEI = 1 << 9;
    }
}

/// TRB type field (control bits 10..=15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrbType {
    Normal = 1,
    SetupStage = 2,
    DataStage = 3,
    StatusStage = 4,
    Isoch = 5,
    Link = 6,
    EventData = 7,
    NoOp = 8,
    EnableSlotCommand = 9,
    DisableSlotCommand = 10,
    AddressDeviceCommand = 11,
    ConfigureEndpointCommand = 12,
    EvaluateContextCommand = 13,
    ResetEndpointCommand = 14,
    StopEndpointCommand = 15,
    SetTrDequeuePointerCommand = 16,
    ResetDeviceCommand = 17,
    NoOpCommand = 23,
    TransferEvent = 32,
    CommandCompletionEvent = 33,
    PortStatusChangeEvent = 34,
    BandwidthRequestEvent = 35,
    DoorbellEvent = 36,
    HostControllerEvent = 37,
    DeviceNotificationEvent = 38,
    MfindexWrapEvent = 39,
}

impl TrbType {
    /// Decode a raw 6-bit type value.
    pub fn from_raw(raw: u8) -> Option<Self> {
        use TrbType::*;
        Some(match raw {
            1 => Normal,
            2 => SetupStage,
            3 => DataStage,
            4 => StatusStage,
            5 => Isoch,
            6 => Link,
            7 => EventData,
            8 => NoOp,
            9 => EnableSlotCommand,
            10 => DisableSlotCommand,
            11 => AddressDeviceCommand,
            12 => ConfigureEndpointCommand,
            13 => EvaluateContextCommand,
            14 => ResetEndpointCommand,
            15 => StopEndpointCommand,
            16 => SetTrDequeuePointerCommand,
            17 => ResetDeviceCommand,
            23 => NoOpCommand,
            32 => TransferEvent,
            33 => CommandCompletionEvent,
            34 => PortStatusChangeEvent,
            35 => BandwidthRequestEvent,
            36 => DoorbellEvent,
            37 => HostControllerEvent,
            38 => DeviceNotificationEvent,
            39 => MfindexWrapEvent,
            _ => return None,
        })
    }

    /// Whether the type may only appear on an event ring.
    pub fn is_event(self) -> bool {
        (self as u8) >= TrbType::TransferEvent as u8
    }
}

/// Completion code carried in status bits 24..=31 of event TRBs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Invalid,
    Success,
    DataBufferError,
    BabbleDetected,
    UsbTransactionError,
    TrbError,
    StallError,
    ResourceError,
    BandwidthError,
    NoSlotsAvailable,
    SlotNotEnabled,
    EndpointNotEnabled,
    ShortPacket,
    RingUnderrun,
    RingOverrun,
    ParameterError,
    ContextStateError,
    EventRingFull,
    MissedService,
    CommandRingStopped,
    CommandAborted,
    Stopped,
    StoppedLengthInvalid,
    StoppedShortPacket,
    Other(u8),
}

impl CompletionCode {
    pub fn from_raw(raw: u8) -> Self {
        use CompletionCode::*;
        match raw {
            0 => Invalid,
            1 => Success,
            2 => DataBufferError,
            3 => BabbleDetected,
            4 => UsbTransactionError,
            5 => TrbError,
            6 => StallError,
            7 => ResourceError,
            8 => BandwidthError,
            9 => NoSlotsAvailable,
            11 => SlotNotEnabled,
            12 => EndpointNotEnabled,
            13 => ShortPacket,
            14 => RingUnderrun,
            15 => RingOverrun,
            17 => ParameterError,
            19 => ContextStateError,
            21 => EventRingFull,
            23 => MissedService,
            24 => CommandRingStopped,
            25 => CommandAborted,
            26 => Stopped,
            27 => StoppedLengthInvalid,
            28 => StoppedShortPacket,
            other => Other(other),
        }
    }

    pub fn raw(self) -> u8 {
        use CompletionCode::*;
        match self {
            Invalid => 0,
            Success => 1,
            DataBufferError => 2,
            BabbleDetected => 3,
            UsbTransactionError => 4,
            TrbError => 5,
            StallError => 6,
            ResourceError => 7,
            BandwidthError => 8,
            NoSlotsAvailable => 9,
            SlotNotEnabled => 11,
            EndpointNotEnabled => 12,
            ShortPacket => 13,
            RingUnderrun => 14,
            RingOverrun => 15,
            ParameterError => 17,
            ContextStateError => 19,
            EventRingFull => 21,
            MissedService => 23,
            CommandRingStopped => 24,
            CommandAborted => 25,
            Stopped => 26,
            StoppedLengthInvalid => 27,
            StoppedShortPacket => 28,
            Other(raw) => raw,
        }
    }

    /// Success and short packet both mean the data phase finished.
    pub fn is_ok(self) -> bool {
        matches!(self, CompletionCode::Success | CompletionCode::ShortPacket)
    }

    /// Posted when a Stop Endpoint command halts the ring mid-TD. The TD
    /// itself did not finish.
    pub fn is_stopped(self) -> bool {
        matches!(
            self,
            CompletionCode::Stopped
                | CompletionCode::StoppedLengthInvalid
                | CompletionCode::StoppedShortPacket
        )
    }
}

/// One Transfer Request Block, bit-exact with the hardware layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct Trb {
    /// Parameter / data buffer pointer.
    pub ptr: u64,
    pub status: u32,
    pub control: u32,
}

const _: () = assert!(core::mem::size_of::<Trb>() == TRB_SIZE);

impl Trb {
    /// A TRB of the given type with every other field zero.
    pub fn new(trb_type: TrbType) -> Self {
        let mut trb = Self::default();
        trb.set_trb_type(trb_type);
        trb
    }

    /// Normal TRB describing `len` bytes at `buffer`.
    pub fn normal(buffer: u64, len: u32, flags: TrbFlags) -> Self {
        let mut trb = Self::new(TrbType::Normal);
        trb.ptr = buffer;
        trb.status = len & TRB_TRANSFER_LEN_MASK;
        trb.set_flags(flags);
        trb
    }

    /// Link TRB to `target` with the toggle-cycle flag set.
    pub fn link(target: u64) -> Self {
        let mut trb = Self::new(TrbType::Link);
        trb.ptr = target;
        trb.set_flags(TrbFlags::TOGGLE_CYCLE);
        trb
    }

    /// Transfer Event as the controller writes it.
    pub fn transfer_event(
        trb_phys: u64,
        code: CompletionCode,
        residual: u32,
        slot: u8,
        endpoint: u8,
    ) -> Self {
        let mut trb = Self::new(TrbType::TransferEvent);
        trb.ptr = trb_phys;
        trb.status = ((code.raw() as u32) << TRB_COMPLETION_SHIFT) | (residual & TRB_TRANSFER_LEN_MASK);
        trb.set_slot_id(slot);
        trb.set_endpoint_id(endpoint);
        trb
    }

    /// Command Completion Event for the command TRB at `command_phys`.
    pub fn command_completion(command_phys: u64, code: CompletionCode, slot: u8) -> Self {
        let mut trb = Self::new(TrbType::CommandCompletionEvent);
        trb.ptr = command_phys;
        trb.status = (code.raw() as u32) << TRB_COMPLETION_SHIFT;
        trb.set_slot_id(slot);
        trb
    }

    /// Port Status Change Event for root-hub port `port` (1-based).
    pub fn port_status_change(port: u8) -> Self {
        let mut trb = Self::new(TrbType::PortStatusChangeEvent);
        trb.ptr = (port as u64) << TRB_PORT_ID_SHIFT;
        trb.status = (CompletionCode::Success.raw() as u32) << TRB_COMPLETION_SHIFT;
        trb
    }

    pub fn cycle(&self) -> bool {
        self.control & TrbFlags::CYCLE.bits() != 0
    }

    pub fn set_cycle(&mut self, cycle: bool) {
        self.control = (self.control & !TrbFlags::CYCLE.bits()) | cycle as u32;
    }

    /// Raw type field, masked to its documented bit range.
    pub fn raw_type(&self) -> u8 {
        ((self.control & TRB_TYPE_MASK) >> TRB_TYPE_SHIFT) as u8
    }

    pub fn trb_type(&self) -> Option<TrbType> {
        TrbType::from_raw(self.raw_type())
    }

    pub fn set_trb_type(&mut self, trb_type: TrbType) {
        self.control = (self.control & !TRB_TYPE_MASK) | ((trb_type as u32) << TRB_TYPE_SHIFT);
    }

    pub fn is_link(&self) -> bool {
        self.trb_type() == Some(TrbType::Link)
    }

    /// Flag bits of the control dword; unknown bits are dropped.
    pub fn flags(&self) -> TrbFlags {
        TrbFlags::from_bits_truncate(self.control)
    }

    /// Replace the flag bits, keeping type, ids and cycle.
    pub fn set_flags(&mut self, flags: TrbFlags) {
        let keep = TrbFlags::all().bits() & !TrbFlags::CYCLE.bits();
        self.control = (self.control & !keep) | (flags.bits() & keep);
    }

    pub fn chain(&self) -> bool {
        self.flags().contains(TrbFlags::CHAIN)
    }

    pub fn slot_id(&self) -> u8 {
        (self.control >> TRB_SLOT_SHIFT) as u8
    }

    pub fn set_slot_id(&mut self, slot: u8) {
        self.control = (self.control & !(0xFF << TRB_SLOT_SHIFT)) | ((slot as u32) << TRB_SLOT_SHIFT);
    }

    /// Endpoint (DCI) an event refers to.
    pub fn endpoint_id(&self) -> u8 {
        ((self.control & TRB_ENDPOINT_MASK) >> TRB_ENDPOINT_SHIFT) as u8
    }

    pub fn set_endpoint_id(&mut self, endpoint: u8) {
        self.control = (self.control & !TRB_ENDPOINT_MASK)
            | (((endpoint as u32) << TRB_ENDPOINT_SHIFT) & TRB_ENDPOINT_MASK);
    }

    pub fn completion_code(&self) -> CompletionCode {
        CompletionCode::from_raw((self.status >> TRB_COMPLETION_SHIFT) as u8)
    }

    /// Transfer length (request TRBs) or residual length (transfer events).
    pub fn transfer_len(&self) -> u32 {
        self.status & TRB_TRANSFER_LEN_MASK
    }

    /// Root-hub port referenced by a port status change event.
    pub fn port_id(&self) -> Option<u8> {
        match (self.ptr >> TRB_PORT_ID_SHIFT) as u8 {
            0 => None,
            id => Some(id),
        }
    }
}

/// One Event Ring Segment Table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct ErstEntry {
    /// Physical base of the segment.
    pub base: u64,
    /// Segment length in TRBs.
    pub size: u32,
    pub reserved: u32,
}

const _: () = assert!(core::mem::size_of::<ErstEntry>() == crate::config::ERST_ENTRY_SIZE);

/// Read a TRB the device may be writing concurrently.
///
/// # Safety
///
/// `slot` must point at a live, aligned TRB in ring memory.
pub(crate) unsafe fn read_volatile(slot: *const Trb) -> Trb {
    Trb {
        ptr: core::ptr::read_volatile(addr_of!((*slot).ptr)),
        status: core::ptr::read_volatile(addr_of!((*slot).status)),
        control: core::ptr::read_volatile(addr_of!((*slot).control)),
    }
}

/// Control dword only; hardware polls this for the cycle bit.
///
/// # Safety
///
/// Same as [`read_volatile`].
pub(crate) unsafe fn read_control(slot: *const Trb) -> u32 {
    core::ptr::read_volatile(addr_of!((*slot).control))
}

/// Write parameter and status. The control dword is left to the caller so
/// ownership can be handed over last.
///
/// # Safety
///
/// Same as [`read_volatile`], and the slot must be owned by software.
pub(crate) unsafe fn write_body(slot: *mut Trb, trb: &Trb) {
    core::ptr::write_volatile(addr_of_mut!((*slot).ptr), trb.ptr);
    core::ptr::write_volatile(addr_of_mut!((*slot).status), trb.status);
}

/// # Safety
///
/// Same as [`write_body`].
pub(crate) unsafe fn write_control(slot: *mut Trb, control: u32) {
    core::ptr::write_volatile(addr_of_mut!((*slot).control), control);
}
