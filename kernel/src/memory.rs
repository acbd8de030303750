//! Memory management for the ring engine
//!
//! The engine never owns a page allocator. Physically contiguous memory comes
//! from an external [`dma::DmaAllocator`] supplied by the embedding kernel, and
//! every region handed out is registered with an [`translate::AddressTranslator`]
//! so descriptor pointers can be mapped between the device's physical view and
//! the kernel's virtual view.
//!
//! - [`dma`]: allocator interface, shared DMA context and owned buffers
//! - [`translate`]: physical <-> virtual mapping over owned regions
//! - [`heap`]: heap-backed allocator with a fabricated device address space

pub mod dma;
pub mod heap;
pub mod translate;

use core::fmt;

/// A physically contiguous allocation as reported by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// Kernel virtual address of the first byte.
    pub virt: u64,
    /// Device-visible physical address of the first byte.
    pub phys: u64,
    /// Length in bytes.
    pub size: usize,
}

impl DmaRegion {
    /// Whether `phys` falls inside this region.
    pub fn contains_phys(&self, phys: u64) -> bool {
        phys >= self.phys && phys - self.phys < self.size as u64
    }

    /// Whether `virt` falls inside this region.
    pub fn contains_virt(&self, virt: u64) -> bool {
        virt >= self.virt && virt - self.virt < self.size as u64
    }
}

/// Errors reported by DMA allocators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No contiguous range of the requested size is available.
    OutOfMemory,
    /// Zero size or an alignment that is not a power of two.
    InvalidLayout,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of DMA memory"),
            Self::InvalidLayout => write!(f, "invalid DMA allocation layout"),
        }
    }
}

pub type AllocResult<T> = Result<T, AllocError>;
