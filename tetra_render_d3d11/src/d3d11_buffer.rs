/// Dx11Buffer - Direct3D 11 implementation of the Buffer trait
///
/// Vertex and index buffers use default usage: initial data at creation,
/// `UpdateSubresource` afterwards. Constant buffers are dynamic and keep a
/// host shadow; every update rewrites the whole buffer with
/// `Map(WRITE_DISCARD)` so partial updates still see the rest of the block.

use std::any::Any;
use std::sync::Arc;
use tetra_render::resource::{align_up, check_update_range};
use tetra_render::{
    AliveFlag, Buffer, BufferDesc, BufferRef, BufferUsage, Error, GpuResource, HostData, IndexFormat, Result,
};

use crate::d3d11_context::GpuContext;
use crate::d3d11_convert::{hr_err, CONSTANT_BUFFER_ALIGNMENT};
use crate::device::{BufferBind, BufferResourceDesc, NativeHandle};

const SOURCE: &str = "tetra::d3d11::buffer";

pub struct Dx11Buffer {
    label: String,
    usage: BufferUsage,
    size: u64,
    stride: u32,
    pub(crate) resource: NativeHandle,
    /// Constant buffers only
    shadow: Option<HostData>,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl Dx11Buffer {
    pub fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_buffer")?;

        let (bind, dynamic, native_size) = match desc.usage {
            BufferUsage::Vertex => (BufferBind::Vertex, false, desc.size),
            BufferUsage::Index => (BufferBind::Index, false, desc.size),
            BufferUsage::Constant => (BufferBind::Constant, true, align_up(desc.size, CONSTANT_BUFFER_ALIGNMENT)),
        };
        let native_size = u32::try_from(native_size).map_err(|_| {
            tetra_render::render_warn_err!(SOURCE, "Buffer '{}' is too large ({} bytes)", desc.label, desc.size)
        })?;
        let shadow = dynamic.then(|| HostData::new(desc.size as usize, desc.data.as_deref()));
        let initial = shadow.as_ref().map(HostData::snapshot).or_else(|| desc.data.clone());

        let resource = ctx
            .device
            .create_buffer(&desc.label, &BufferResourceDesc { size: native_size, bind, dynamic }, initial.as_deref())
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create buffer '{}'", desc.label), hr))?;

        tetra_render::render_trace!(SOURCE, "Created {:?} buffer '{}' ({} bytes)", desc.usage, desc.label, desc.size);
        Ok(Arc::new(Self {
            label: desc.label.clone(),
            usage: desc.usage,
            size: desc.size,
            stride: desc.stride,
            resource,
            shadow,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    pub(crate) fn index_format(&self) -> Option<IndexFormat> {
        IndexFormat::from_stride(self.stride)
    }

    /// Downcast a shared handle, rejecting expired, foreign or misused buffers
    pub(crate) fn from_handle<'a>(handle: &'a BufferRef, expected: BufferUsage) -> Result<&'a Dx11Buffer> {
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
        handle.as_any().downcast_ref::<Dx11Buffer>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Buffer '{}' was not created by the D3D11 backend", handle.label())
        })
    }
}

impl GpuResource for Dx11Buffer {
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
        self.ctx.device.release(self.resource);
    }
}

impl Buffer for Dx11Buffer {
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
        match &self.shadow {
            Some(shadow) => {
                shadow.write(&self.label, offset, data)?;
                self.ctx
                    .device
                    .map_discard(self.resource, &shadow.snapshot())
                    .map_err(|hr| hr_err(SOURCE, &format!("Failed to map '{}'", self.label), hr))
            }
            None => {
                check_update_range(&self.label, self.size, offset, data.len())?;
                if data.is_empty() {
                    return Ok(());
                }
                self.ctx
                    .device
                    .update_subresource(self.resource, offset as u32, data)
                    .map_err(|hr| hr_err(SOURCE, &format!("Failed to update '{}'", self.label), hr))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Dx11Buffer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "d3d11_buffer_tests.rs"]
mod tests;
