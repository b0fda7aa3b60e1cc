/// Dx12Buffer - Direct3D 12 implementation of the Buffer trait
///
/// Vertex and index buffers are default-heap resources written through the
/// blocking copy path; buffers start and stay in COMMON and rely on implicit
/// promotion. Constant buffers live on the host and are copied into the
/// frame's constant ring when a draw flushes them.

use std::any::Any;
use std::sync::Arc;
use tetra_render::resource::check_update_range;
use tetra_render::{
    AliveFlag, Buffer, BufferDesc, BufferRef, BufferUsage, Error, GpuResource, HostData, IndexFormat,
    ResourceId, Result,
};

use crate::d3d12_context::GpuContext;
use crate::d3d12_convert::hr_err;
use crate::device::{HeapKind, ListCommand, NativeHandle, ResourceDesc, ResourceState};

const SOURCE: &str = "tetra::d3d12::buffer";

enum Storage {
    Device(NativeHandle),
    Host(HostData),
}

pub struct Dx12Buffer {
    pub(crate) id: ResourceId,
    label: String,
    usage: BufferUsage,
    size: u64,
    stride: u32,
    storage: Storage,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl Dx12Buffer {
    pub fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_buffer")?;

        let storage = match desc.usage {
            BufferUsage::Constant => Storage::Host(HostData::new(desc.size as usize, desc.data.as_deref())),
            BufferUsage::Vertex | BufferUsage::Index => {
                let resource = ctx
                    .device
                    .create_committed_resource(
                        &desc.label,
                        HeapKind::Default,
                        &ResourceDesc::Buffer { size: desc.size },
                        ResourceState::Common,
                    )
                    .map_err(|hr| hr_err(SOURCE, &format!("Failed to create buffer '{}'", desc.label), hr))?;
                Storage::Device(resource)
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

    /// Native resource of a vertex/index buffer
    pub(crate) fn resource(&self) -> Option<NativeHandle> {
        match &self.storage {
            Storage::Device(resource) => Some(*resource),
            Storage::Host(_) => None,
        }
    }

    /// Host copy of a constant buffer
    pub(crate) fn host_data(&self) -> Option<&HostData> {
        match &self.storage {
            Storage::Host(data) => Some(data),
            Storage::Device(_) => None,
        }
    }

    pub(crate) fn index_format(&self) -> Option<IndexFormat> {
        IndexFormat::from_stride(self.stride)
    }

    /// Downcast a shared handle, rejecting expired or foreign buffers
    pub(crate) fn from_handle<'a>(handle: &'a BufferRef, expected: BufferUsage) -> Result<&'a Dx12Buffer> {
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
        handle.as_any().downcast_ref::<Dx12Buffer>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Buffer '{}' was not created by the D3D12 backend", handle.label())
        })
    }
}

impl GpuResource for Dx12Buffer {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    fn cleanup(&self) {
        if !self.alive.retire() || !self.ctx.is_alive() {
            return;
        }
        if let Storage::Device(resource) = &self.storage {
            self.ctx.device.release(*resource);
        }
    }
}

impl Buffer for Dx12Buffer {
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
            Storage::Device(resource) => {
                check_update_range(&self.label, self.size, offset, data.len())?;
                if data.is_empty() {
                    return Ok(());
                }
                let dst = *resource;
                let size = data.len() as u64;
                self.ctx.upload(&self.label, data, |device, list, staging| {
                    device.record(
                        list,
                        ListCommand::CopyBufferRegion { dst, dst_offset: offset, src: staging, src_offset: 0, size },
                    );
                })
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Dx12Buffer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
