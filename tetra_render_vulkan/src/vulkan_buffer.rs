/// VulkanBuffer - Vulkan implementation of the Buffer trait
///
/// Vertex and index buffers are host-visible `VkBuffer`s written through the
/// persistent mapping. Constant buffers stay on the host: their contents are
/// copied into the frame's uniform ring at draw time, so an update between
/// two draws of the same frame is seen by the second draw only.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use tetra_render::resource::check_update_range;
use tetra_render::{
    AliveFlag, Buffer, BufferDesc, BufferRef, BufferUsage, Error, GpuResource, HostData, IndexFormat,
    ResourceId, Result,
};

use crate::vulkan_context::GpuContext;

const SOURCE: &str = "tetra::vulkan::buffer";

enum Storage {
    Device {
        buffer: vk::Buffer,
        allocation: Mutex<Option<Allocation>>,
    },
    Host(HostData),
}

pub struct VulkanBuffer {
    pub(crate) id: ResourceId,
    label: String,
    usage: BufferUsage,
    size: u64,
    stride: u32,
    storage: Storage,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl VulkanBuffer {
    pub fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_buffer")?;

        let storage = match desc.usage {
            BufferUsage::Constant => Storage::Host(HostData::new(desc.size as usize, desc.data.as_deref())),
            BufferUsage::Vertex | BufferUsage::Index => {
                let usage = if desc.usage == BufferUsage::Vertex {
                    vk::BufferUsageFlags::VERTEX_BUFFER
                } else {
                    vk::BufferUsageFlags::INDEX_BUFFER
                };
                let (buffer, allocation) = ctx.create_buffer(&desc.label, desc.size, usage, MemoryLocation::CpuToGpu)?;
                Storage::Device { buffer, allocation: Mutex::new(Some(allocation)) }
            }
        };

        let buffer = Arc::new(Self {
            id: ResourceId::next(),
            label: desc.label.clone(),
            usage: desc.usage,
            size: desc.size,
            stride: desc.stride,
            storage,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        });

        if let Some(data) = &desc.data {
            if desc.usage != BufferUsage::Constant {
                buffer.update(0, data)?;
            }
        }

        tetra_render::render_trace!(SOURCE, "Created {:?} buffer '{}' ({} bytes)", desc.usage, desc.label, desc.size);
        Ok(buffer)
    }

    /// Native buffer of a vertex/index buffer
    pub(crate) fn vk_buffer(&self) -> Option<vk::Buffer> {
        match &self.storage {
            Storage::Device { buffer, .. } => Some(*buffer),
            Storage::Host(_) => None,
        }
    }

    /// Host copy of a constant buffer
    pub(crate) fn host_data(&self) -> Option<&HostData> {
        match &self.storage {
            Storage::Host(data) => Some(data),
            Storage::Device { .. } => None,
        }
    }

    pub(crate) fn index_format(&self) -> Option<IndexFormat> {
        IndexFormat::from_stride(self.stride)
    }

    /// Downcast a shared handle, rejecting expired or foreign buffers
    pub(crate) fn from_handle<'a>(handle: &'a BufferRef, expected: BufferUsage) -> Result<&'a VulkanBuffer> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Buffer '{}' has expired", handle.label()));
        }
        if handle.usage() != expected {
            return Err(tetra_render::render_warn_err!(
                SOURCE,
                "Buffer '{}' is a {:?} buffer, expected {:?}",
                handle.label(), handle.usage(), expected
            ));
        }
        handle.as_any().downcast_ref::<VulkanBuffer>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Buffer '{}' was not created by the Vulkan backend", handle.label())
        })
    }
}

impl GpuResource for VulkanBuffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    fn cleanup(&self) {
        if !self.alive.retire() {
            return;
        }
        if let Storage::Device { buffer, allocation } = &self.storage {
            if !self.ctx.is_alive() {
                return;
            }
            let allocation = allocation.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(allocation) = allocation {
                self.ctx.free(allocation);
            }
            unsafe {
                self.ctx.device.destroy_buffer(*buffer, None);
            }
        }
    }
}

impl Buffer for VulkanBuffer {
    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::InvalidResource(format!("Buffer '{}' has expired", self.label)));
        }
        match &self.storage {
            Storage::Host(host) => host.write(&self.label, offset, data),
            Storage::Device { allocation, .. } => {
                check_update_range(&self.label, self.size, offset, data.len())?;
                let guard = allocation.lock().unwrap_or_else(PoisonError::into_inner);
                let mapped = guard
                    .as_ref()
                    .and_then(|a| a.mapped_ptr())
                    .ok_or_else(|| tetra_render::render_err!(SOURCE, "Buffer '{}' is not CPU-accessible", self.label))?;
                unsafe {
                    let dst = (mapped.as_ptr() as *mut u8).add(offset as usize);
                    std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
                }
                Ok(())
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
