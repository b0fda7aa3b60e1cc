/// Dx12Shader - vertex + pixel shader bytecode
///
/// D3D12 has no standalone shader objects; bytecode is checked here and
/// handed to every pipeline state built for the shader.

use std::any::Any;
use tetra_render::{AliveFlag, GpuResource, ResourceId, Result, Shader, ShaderDesc, ShaderRef, VertexLayout};

const SOURCE: &str = "tetra::d3d12::shader";

/// Container magic of DXBC and DXIL blobs
pub const DXBC_MAGIC: &[u8; 4] = b"DXBC";

/// Check that a stage holds a compiled DXBC/DXIL container
pub fn check_bytecode(label: &str, stage: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() < 32 || &bytes[..4] != DXBC_MAGIC {
        return Err(tetra_render::render_warn_err!(
            SOURCE,
            "Shader '{}' {} stage is not a DXBC container ({} bytes)",
            label, stage, bytes.len()
        ));
    }
    Ok(())
}

pub struct Dx12Shader {
    pub(crate) id: ResourceId,
    label: String,
    layout: VertexLayout,
    pub(crate) vertex: Vec<u8>,
    pub(crate) pixel: Vec<u8>,
    alive: AliveFlag,
}

impl Dx12Shader {
    pub fn create(desc: &ShaderDesc) -> Result<Self> {
        desc.validate()?;
        check_bytecode(&desc.label, "vertex", &desc.vertex.bytecode)?;
        check_bytecode(&desc.label, "pixel", &desc.fragment.bytecode)?;

        tetra_render::render_debug!(SOURCE, "Created shader '{}' ({:?} layout)", desc.label, desc.layout);
        Ok(Self {
            id: ResourceId::next(),
            label: desc.label.clone(),
            layout: desc.layout,
            vertex: desc.vertex.bytecode.clone(),
            pixel: desc.fragment.bytecode.clone(),
            alive: AliveFlag::new(),
        })
    }

    /// Downcast a shared handle, rejecting expired or foreign shaders
    pub(crate) fn from_handle(handle: &ShaderRef) -> Result<&Dx12Shader> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Shader '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<Dx12Shader>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Shader '{}' was not created by the D3D12 backend", handle.label())
        })
    }
}

impl GpuResource for Dx12Shader {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_alive(&self) -> bool {
        self.alive.is_alive()
    }

    fn cleanup(&self) {
        self.alive.retire();
    }
}

impl Shader for Dx12Shader {
    fn layout(&self) -> VertexLayout {
        self.layout
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
