/// GlBuffer - OpenGL implementation of the Buffer trait
///
/// Immutable-size buffer objects filled with `glNamedBufferData`. Constant
/// buffers are uniform buffers padded to std140's 16-byte granularity;
/// updates of every kind go through `glNamedBufferSubData`.

use std::any::Any;
use std::sync::Arc;
use tetra_render::resource::{align_up, check_update_range};
use tetra_render::{AliveFlag, Buffer, BufferDesc, BufferRef, BufferUsage, Error, GpuResource, IndexFormat, Result};

use crate::api::GlName;
use crate::gl_context::GpuContext;
use crate::gl_convert::{check_error, GL_DYNAMIC_DRAW, GL_STATIC_DRAW};

const SOURCE: &str = "tetra::gl::buffer";

const UNIFORM_BLOCK_ALIGNMENT: u64 = 16;

pub struct GlBuffer {
    label: String,
    usage: BufferUsage,
    size: u64,
    stride: u32,
    pub(crate) name: GlName,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl GlBuffer {
    pub fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_buffer")?;

        let (gl_usage, native_size) = match desc.usage {
            BufferUsage::Vertex | BufferUsage::Index => (GL_STATIC_DRAW, desc.size),
            BufferUsage::Constant => (GL_DYNAMIC_DRAW, align_up(desc.size, UNIFORM_BLOCK_ALIGNMENT)),
        };
        let native_size = usize::try_from(native_size).map_err(|_| {
            tetra_render::render_warn_err!(SOURCE, "Buffer '{}' is too large ({} bytes)", desc.label, desc.size)
        })?;
        // Padding is zero-filled so the upload length matches the allocation
        let initial = desc.data.as_deref().map(|data| {
            let mut bytes = data.to_vec();
            bytes.resize(native_size, 0);
            bytes
        });

        let api = ctx.api.as_ref();
        let name = api.create_buffer();
        api.named_buffer_data(name, native_size, initial.as_deref(), gl_usage);
        if let Err(error) = check_error(api, SOURCE, &format!("Failed to create buffer '{}'", desc.label)) {
            api.delete_buffer(name);
            return Err(error);
        }

        tetra_render::render_trace!(SOURCE, "Created {:?} buffer '{}' ({} bytes)", desc.usage, desc.label, desc.size);
        Ok(Arc::new(Self {
            label: desc.label.clone(),
            usage: desc.usage,
            size: desc.size,
            stride: desc.stride,
            name,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    pub(crate) fn index_format(&self) -> Option<IndexFormat> {
        IndexFormat::from_stride(self.stride)
    }

    /// Downcast a shared handle, rejecting expired, foreign or misused buffers
    pub(crate) fn from_handle<'a>(handle: &'a BufferRef, expected: BufferUsage) -> Result<&'a GlBuffer> {
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
        handle.as_any().downcast_ref::<GlBuffer>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Buffer '{}' was not created by the OpenGL backend", handle.label())
        })
    }
}

impl GpuResource for GlBuffer {
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
        self.ctx.api.delete_buffer(self.name);
    }
}

impl Buffer for GlBuffer {
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
        check_update_range(&self.label, self.size, offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.ctx.require_alive("update_buffer")?;
        let api = self.ctx.api.as_ref();
        api.named_buffer_sub_data(self.name, offset as usize, data);
        check_error(api, SOURCE, &format!("Failed to update '{}'", self.label))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GlBuffer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "gl_buffer_tests.rs"]
mod tests;
