//! Device slot bookkeeping.
//!
//! The controller assigns a slot id to every attached device. The manager
//! records where the device sits in the topology and owns the transfer rings
//! of its endpoints.

use alloc::collections::BTreeMap;
use core::fmt;

use super::error::{XhciError, XhciResult};
use super::rings::TransferRing;

/// Negotiated link speed, using the default protocol speed ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UsbSpeed {
    Full = 1,
    Low = 2,
    High = 3,
    Super = 4,
    SuperPlus = 5,
}

impl UsbSpeed {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Full),
            2 => Some(Self::Low),
            3 => Some(Self::High),
            4 => Some(Self::Super),
            5 => Some(Self::SuperPlus),
            _ => None,
        }
    }
}

impl fmt::Display for UsbSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full-speed",
            Self::Low => "low-speed",
            Self::High => "high-speed",
            Self::Super => "SuperSpeed",
            Self::SuperPlus => "SuperSpeedPlus",
        };
        f.write_str(name)
    }
}

/// State kept for one attached device.
pub struct DeviceSlot {
    pub slot_id: u8,
    /// Address of the hub the device hangs off (0 for the root hub).
    pub hub_address: u8,
    pub port: u8,
    pub speed: UsbSpeed,
    endpoints: BTreeMap<u8, TransferRing>,
}

impl DeviceSlot {
    pub fn endpoint(&self, endpoint: u8) -> Option<&TransferRing> {
        self.endpoints.get(&endpoint)
    }

    pub fn endpoint_mut(&mut self, endpoint: u8) -> Option<&mut TransferRing> {
        self.endpoints.get_mut(&endpoint)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = (u8, &TransferRing)> + '_ {
        self.endpoints.iter().map(|(&ep, ring)| (ep, ring))
    }

    pub fn endpoints_mut(&mut self) -> impl Iterator<Item = (u8, &mut TransferRing)> + '_ {
        self.endpoints.iter_mut().map(|(&ep, ring)| (ep, ring))
    }

    pub(crate) fn insert_endpoint(&mut self, endpoint: u8, ring: TransferRing) -> XhciResult<()> {
        if self.endpoints.contains_key(&endpoint) {
            return Err(XhciError::EndpointExists {
                slot: self.slot_id,
                endpoint,
            });
        }
        self.endpoints.insert(endpoint, ring);
        Ok(())
    }

    pub(crate) fn take_endpoint(&mut self, endpoint: u8) -> Option<TransferRing> {
        self.endpoints.remove(&endpoint)
    }

    /// Close every ring, deferring outstanding requests. Returns how many
    /// requests were moved.
    pub fn close_all(&mut self) -> usize {
        self.endpoints.values_mut().map(|ring| ring.close()).sum()
    }

    /// Release all ring memory. Only valid once the controller has stopped
    /// every endpoint of this slot.
    pub fn release(self) {
        for (_, ring) in self.endpoints {
            ring.release();
        }
    }
}

/// Table of attached device slots.
#[derive(Default)]
pub struct DeviceManager {
    slots: BTreeMap<u8, DeviceSlot>,
}

impl DeviceManager {
    pub const fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    /// Register a newly addressed device.
    pub fn add_device(&mut self, slot_id: u8, hub_address: u8, port: u8, speed: UsbSpeed) -> XhciResult<()> {
        if self.slots.contains_key(&slot_id) {
            return Err(XhciError::DuplicateSlot(slot_id));
        }
        self.slots.insert(
            slot_id,
            DeviceSlot {
                slot_id,
                hub_address,
                port,
                speed,
                endpoints: BTreeMap::new(),
            },
        );
        log_info!(
            "slot {} attached: hub={} port={} {}",
            slot_id,
            hub_address,
            port,
            speed
        );
        Ok(())
    }

    /// Detach a device. Its rings are closed first, so outstanding requests
    /// sit on the deferred lists of the returned slot; ring memory stays
    /// allocated until the caller releases the slot.
    pub fn remove_device(&mut self, slot_id: u8) -> XhciResult<DeviceSlot> {
        let mut slot = self
            .slots
            .remove(&slot_id)
            .ok_or(XhciError::UnknownSlot(slot_id))?;
        let deferred = slot.close_all();
        log_debug!("slot {} detached, {} requests deferred", slot_id, deferred);
        Ok(slot)
    }

    pub fn get(&self, slot_id: u8) -> XhciResult<&DeviceSlot> {
        self.slots.get(&slot_id).ok_or(XhciError::UnknownSlot(slot_id))
    }

    pub fn get_mut(&mut self, slot_id: u8) -> XhciResult<&mut DeviceSlot> {
        self.slots
            .get_mut(&slot_id)
            .ok_or(XhciError::UnknownSlot(slot_id))
    }

    /// Transfer ring of `endpoint` on `slot_id`.
    pub fn ring_mut(&mut self, slot_id: u8, endpoint: u8) -> XhciResult<&mut TransferRing> {
        self.get_mut(slot_id)?
            .endpoint_mut(endpoint)
            .ok_or(XhciError::UnknownEndpoint {
                slot: slot_id,
                endpoint,
            })
    }

    pub fn contains(&self, slot_id: u8) -> bool {
        self.slots.contains_key(&slot_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceSlot> + '_ {
        self.slots.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceSlot> + '_ {
        self.slots.values_mut()
    }
}
