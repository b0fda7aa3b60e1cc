/// Dx11Shader - vertex + pixel shader objects
///
/// The vertex bytecode is kept: input layouts are validated against it when
/// the state cache builds one for a (shader, vertex layout) pair.

use std::any::Any;
use std::sync::Arc;
use tetra_render::{AliveFlag, GpuResource, ResourceId, Result, Shader, ShaderDesc, ShaderRef, VertexLayout};

use crate::d3d11_context::GpuContext;
use crate::d3d11_convert::hr_err;
use crate::device::NativeHandle;

const SOURCE: &str = "tetra::d3d11::shader";

const DXBC_MAGIC: &[u8; 4] = b"DXBC";

fn check_bytecode(label: &str, stage: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() < 32 || &bytes[..4] != DXBC_MAGIC {
        return Err(tetra_render::render_warn_err!(
            SOURCE,
            "Shader '{}' {} stage is not a DXBC container ({} bytes)",
            label, stage, bytes.len()
        ));
    }
    Ok(())
}

pub struct Dx11Shader {
    pub(crate) id: ResourceId,
    label: String,
    layout: VertexLayout,
    pub(crate) vertex_bytecode: Vec<u8>,
    pub(crate) vertex_shader: NativeHandle,
    pub(crate) pixel_shader: NativeHandle,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl Dx11Shader {
    pub fn create(ctx: &Arc<GpuContext>, desc: &ShaderDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_shader")?;
        check_bytecode(&desc.label, "vertex", &desc.vertex.bytecode)?;
        check_bytecode(&desc.label, "pixel", &desc.fragment.bytecode)?;

        let device = ctx.device.as_ref();
        let vertex_shader = device
            .create_vertex_shader(&desc.vertex.bytecode)
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create vertex shader '{}'", desc.label), hr))?;
        let pixel_shader = match device.create_pixel_shader(&desc.fragment.bytecode) {
            Ok(shader) => shader,
            Err(hr) => {
                device.release(vertex_shader);
                return Err(hr_err(SOURCE, &format!("Failed to create pixel shader '{}'", desc.label), hr));
            }
        };

        tetra_render::render_debug!(SOURCE, "Created shader '{}' ({:?} layout)", desc.label, desc.layout);
        Ok(Arc::new(Self {
            id: ResourceId::next(),
            label: desc.label.clone(),
            layout: desc.layout,
            vertex_bytecode: desc.vertex.bytecode.clone(),
            vertex_shader,
            pixel_shader,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    /// Downcast a shared handle, rejecting expired or foreign shaders
    pub(crate) fn from_handle(handle: &ShaderRef) -> Result<&Dx11Shader> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Shader '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<Dx11Shader>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Shader '{}' was not created by the D3D11 backend", handle.label())
        })
    }
}

impl GpuResource for Dx11Shader {
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
        self.ctx.device.release(self.pixel_shader);
        self.ctx.device.release(self.vertex_shader);
    }
}

impl Shader for Dx11Shader {
    fn layout(&self) -> VertexLayout {
        self.layout
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Dx11Shader {
    fn drop(&mut self) {
        self.cleanup();
    }
}
