//! Physical <-> virtual address translation for ring memory.
//!
//! Descriptor pointer fields hold device-physical addresses. Software needs
//! the kernel virtual address to dereference them, and the device must be told
//! physical addresses for anything software allocated. The translator keeps
//! the table of regions the engine owns and maps in both directions; the two
//! mappings are total and mutually inverse over that table.
//!
//! Addresses outside owned memory are a programming error: the panicking
//! variants are for addresses software produced itself, the `try_` variants
//! for pointers read back from hardware that must be validated first.

use alloc::vec::Vec;
use spin::Mutex;

use super::DmaRegion;

/// Table of owned DMA regions.
pub struct AddressTranslator {
    regions: Mutex<Vec<DmaRegion>>,
}

impl AddressTranslator {
    /// Create a translator with no owned regions.
    pub const fn new() -> Self {
        Self {
            regions: Mutex::new(Vec::new()),
        }
    }

    /// Start tracking `region`.
    ///
    /// Overlapping registrations indicate a broken allocator and panic.
    pub fn register(&self, region: DmaRegion) {
        let mut regions = self.regions.lock();
        let overlaps = regions.iter().any(|r| {
            r.contains_phys(region.phys)
                || region.contains_phys(r.phys)
                || r.contains_virt(region.virt)
                || region.contains_virt(r.virt)
        });
        assert!(
            !overlaps,
            "DMA region phys={:#x} virt={:#x} overlaps an owned region",
            region.phys, region.virt
        );
        regions.push(region);
    }

    /// Stop tracking the region starting at `virt`. Returns the removed region.
    pub fn unregister(&self, virt: u64) -> Option<DmaRegion> {
        let mut regions = self.regions.lock();
        let idx = regions.iter().position(|r| r.virt == virt)?;
        Some(regions.swap_remove(idx))
    }

    /// Virtual address for a physical address inside owned memory.
    pub fn try_phys_to_virt(&self, phys: u64) -> Option<u64> {
        self.regions
            .lock()
            .iter()
            .find(|r| r.contains_phys(phys))
            .map(|r| r.virt + (phys - r.phys))
    }

    /// Physical address for a virtual address inside owned memory.
    pub fn try_virt_to_phys(&self, virt: u64) -> Option<u64> {
        self.regions
            .lock()
            .iter()
            .find(|r| r.contains_virt(virt))
            .map(|r| r.phys + (virt - r.virt))
    }

    /// Virtual address for `phys`; panics if `phys` is not owned memory.
    pub fn phys_to_virt(&self, phys: u64) -> u64 {
        match self.try_phys_to_virt(phys) {
            Some(virt) => virt,
            None => panic!("phys {:#x} is not ring memory owned by this controller", phys),
        }
    }

    /// Physical address for `virt`; panics if `virt` is not owned memory.
    pub fn virt_to_phys(&self, virt: u64) -> u64 {
        match self.try_virt_to_phys(virt) {
            Some(phys) => phys,
            None => panic!("virt {:#x} is not ring memory owned by this controller", virt),
        }
    }

    /// Number of regions currently tracked.
    pub fn region_count(&self) -> usize {
        self.regions.lock().len()
    }
}

impl Default for AddressTranslator {
    fn default() -> Self {
        Self::new()
    }
}
