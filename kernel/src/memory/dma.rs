//! DMA-friendly contiguous buffer helpers.
//!
//! The embedding kernel supplies a [`DmaAllocator`] that hands out physically
//! contiguous, cache-coherent memory. [`DmaContext`] pairs that allocator with
//! the controller's [`AddressTranslator`], and [`DmaBuffer`] is the owned
//! handle drivers use for descriptor rings: it zeroes memory on allocation,
//! registers the region for translation, and returns it to the allocator
//! (after unregistering) when dropped.

use alloc::sync::Arc;
use core::mem::{align_of, size_of};

use super::translate::AddressTranslator;
use super::{AllocError, AllocResult, DmaRegion};

/// Physical memory allocator provided by the platform.
///
/// Implementations must return physically contiguous memory that stays
/// mapped (and pinned) at `virt` until [`DmaAllocator::free`] is called.
pub trait DmaAllocator: Send + Sync {
    /// Allocate `size` bytes aligned to `align` (a power of two) in both the
    /// physical and virtual address spaces.
    fn allocate(&self, size: usize, align: usize) -> AllocResult<DmaRegion>;

    /// Return a region obtained from [`DmaAllocator::allocate`].
    ///
    /// # Safety
    ///
    /// Neither software nor the device may access the region afterwards.
    unsafe fn free(&self, region: DmaRegion);
}

/// Allocator plus translation table shared by every buffer of one controller.
pub struct DmaContext {
    allocator: Arc<dyn DmaAllocator>,
    translator: AddressTranslator,
}

impl DmaContext {
    /// Wrap a platform allocator.
    pub fn new(allocator: Arc<dyn DmaAllocator>) -> Arc<Self> {
        Arc::new(Self {
            allocator,
            translator: AddressTranslator::new(),
        })
    }

    /// Translation table covering every live buffer of this context.
    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }
}

/// Contiguous DMA buffer tracking its physical and virtual address.
pub struct DmaBuffer {
    region: DmaRegion,
    context: Arc<DmaContext>,
}

impl DmaBuffer {
    /// Allocate a contiguous buffer with the requested size and alignment.
    ///
    /// `align` is specified in bytes and must be a power of two. The buffer is
    /// zeroed on allocation.
    pub fn allocate(context: &Arc<DmaContext>, size: usize, align: usize) -> AllocResult<Self> {
        let alignment = align.max(1);
        if size == 0 || !alignment.is_power_of_two() {
            return Err(AllocError::InvalidLayout);
        }

        let region = context.allocator.allocate(size, alignment)?;
        debug_assert!(region.size >= size);
        debug_assert_eq!(region.phys % alignment as u64, 0);

        unsafe {
            core::ptr::write_bytes(region.virt as *mut u8, 0, region.size);
        }
        context.translator.register(region);

        log_trace!(
            "DMA buffer allocated phys={:#x} virt={:#x} size={}",
            region.phys,
            region.virt,
            region.size
        );

        Ok(Self {
            region,
            context: Arc::clone(context),
        })
    }

    /// Physical address of the buffer.
    pub fn phys_addr(&self) -> u64 {
        self.region.phys
    }

    /// Virtual address usable by the kernel.
    pub fn virt_addr(&self) -> u64 {
        self.region.virt
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.region.size
    }

    pub fn is_empty(&self) -> bool {
        self.region.size == 0
    }

    /// Context the buffer was allocated from.
    pub fn context(&self) -> &Arc<DmaContext> {
        &self.context
    }

    /// Pointer to a `T` at byte `offset`, bounds- and alignment-checked.
    ///
    /// Panics if the object would extend past the buffer or is misaligned;
    /// both indicate a bug in the caller's layout arithmetic.
    pub fn ptr_at<T>(&self, offset: usize) -> *mut T {
        let end = offset.saturating_add(size_of::<T>());
        assert!(
            end <= self.region.size,
            "DMA access [{:#x}, {:#x}) beyond buffer of {} bytes",
            offset,
            end,
            self.region.size
        );
        let addr = self.region.virt + offset as u64;
        assert_eq!(addr % align_of::<T>() as u64, 0, "misaligned DMA access");
        addr as *mut T
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        self.context.translator.unregister(self.region.virt);
        unsafe { self.context.allocator.free(self.region) };
        log_trace!(
            "DMA buffer released phys={:#x} size={}",
            self.region.phys,
            self.region.size
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::heap::HeapDmaAllocator;

    #[test]
    fn allocation_is_zeroed_and_translatable() {
        let heap = Arc::new(HeapDmaAllocator::new());
        let ctx = DmaContext::new(heap.clone());
        let buf = DmaBuffer::allocate(&ctx, 256, 64).unwrap();

        assert_eq!(buf.phys_addr() % 64, 0);
        assert_eq!(buf.len(), 256);
        let bytes = unsafe { core::slice::from_raw_parts(buf.virt_addr() as *const u8, 256) };
        assert!(bytes.iter().all(|&b| b == 0));

        let t = ctx.translator();
        assert_eq!(t.phys_to_virt(buf.phys_addr() + 32), buf.virt_addr() + 32);
        assert_eq!(heap.live_allocations(), 1);
    }

    #[test]
    fn drop_unregisters_and_frees() {
        let heap = Arc::new(HeapDmaAllocator::new());
        let ctx = DmaContext::new(heap.clone());
        let phys = {
            let buf = DmaBuffer::allocate(&ctx, 64, 16).unwrap();
            buf.phys_addr()
        };
        assert_eq!(ctx.translator().try_phys_to_virt(phys), None);
        assert_eq!(heap.live_allocations(), 0);
    }

    #[test]
    fn rejects_bad_layouts() {
        let ctx = DmaContext::new(Arc::new(HeapDmaAllocator::new()));
        assert_eq!(
            DmaBuffer::allocate(&ctx, 0, 16).err(),
            Some(AllocError::InvalidLayout)
        );
        assert_eq!(
            DmaBuffer::allocate(&ctx, 64, 24).err(),
            Some(AllocError::InvalidLayout)
        );
    }

    #[test]
    #[should_panic(expected = "beyond buffer")]
    fn out_of_bounds_access_panics() {
        let ctx = DmaContext::new(Arc::new(HeapDmaAllocator::new()));
        let buf = DmaBuffer::allocate(&ctx, 32, 16).unwrap();
        let _ = buf.ptr_at::<u64>(28);
    }
}
