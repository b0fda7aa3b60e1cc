/// UniformRing - per-frame linear allocator for dynamic uniform data
///
/// Constant buffers are copied here at draw time and bound through
/// `UNIFORM_BUFFER_DYNAMIC` offsets. One ring per frame slot, reset after the
/// slot's fence has been waited. The first aligned block is a permanent zero
/// page that unbound slots point at.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use tetra_render::resource::{align_up, RingCursor};
use tetra_render::{HostData, Result};

use crate::vulkan_context::GpuContext;

const SOURCE: &str = "tetra::vulkan::uniform_ring";

pub struct UniformRing {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    cursor: RingCursor,
}

impl UniformRing {
    /// `zero_page` must cover the largest descriptor range bound from the ring
    pub fn create(ctx: &GpuContext, name: &str, size: u64, zero_page: u64) -> Result<Self> {
        let alignment = ctx.limits.min_uniform_alignment.max(1);
        let capacity = size.max(align_up(zero_page, alignment) * 2);
        let (buffer, allocation) =
            ctx.create_buffer(name, capacity, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryLocation::CpuToGpu)?;

        let mut ring = Self { buffer, allocation: Some(allocation), cursor: RingCursor::new(capacity, alignment, zero_page) };
        let zero = ring.cursor.zero_page() as usize;
        let zeroed = ring.mapped(0, zero).map(|bytes| bytes.fill(0));
        if let Err(e) = zeroed {
            ring.destroy(ctx);
            return Err(e);
        }
        Ok(ring)
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    pub fn cursor(&self) -> &RingCursor {
        &self.cursor
    }

    /// Copy raw bytes; returns the dynamic offset
    pub fn write(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.reserve(data.len() as u64)?;
        self.mapped(offset, data.len())?.copy_from_slice(data);
        Ok(offset)
    }

    /// Copy a constant buffer's host data into a `range`-byte block (zero padded)
    pub fn copy_host(&mut self, host: &HostData, range: u64) -> Result<u64> {
        let offset = self.reserve(range)?;
        host.copy_into(self.mapped(offset, range as usize)?);
        Ok(offset)
    }

    fn reserve(&mut self, size: u64) -> Result<u64> {
        self.cursor.push(size).ok_or_else(|| {
            tetra_render::render_warn_err!(
                SOURCE,
                "Uniform ring full ({} of {} bytes used), raise uniform_ring_size",
                self.cursor.used(), self.cursor.capacity()
            )
        })
    }

    fn mapped(&mut self, offset: u64, len: usize) -> Result<&mut [u8]> {
        let mapped = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Uniform ring is not host-mapped"))?;
        unsafe {
            let start = (mapped.as_ptr() as *mut u8).add(offset as usize);
            Ok(std::slice::from_raw_parts_mut(start, len))
        }
    }

    pub fn destroy(&mut self, ctx: &GpuContext) {
        if let Some(allocation) = self.allocation.take() {
            ctx.free(allocation);
        }
        unsafe { ctx.device.destroy_buffer(self.buffer, None) };
        self.buffer = vk::Buffer::null();
    }
}

