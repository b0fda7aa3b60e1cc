/// VulkanShader - vertex + fragment SPIR-V modules

use ash::vk;
use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;
use tetra_render::{
    AliveFlag, Error, GpuResource, ResourceId, Result, Shader, ShaderDesc, ShaderRef, VertexLayout,
};

use crate::vulkan_context::GpuContext;
use crate::vulkan_convert::vk_err;

const SOURCE: &str = "tetra::vulkan::shader";

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reinterpret SPIR-V bytes as words, checking size and magic number
pub fn spirv_words(label: &str, stage: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 || bytes.len() < 20 {
        return Err(tetra_render::render_warn_err!(
            SOURCE,
            "Shader '{}' {} stage is {} bytes, not a SPIR-V module",
            label, stage, bytes.len()
        ));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return Err(tetra_render::render_warn_err!(
            SOURCE,
            "Shader '{}' {} stage has bad SPIR-V magic {:#010x}",
            label, stage, words[0]
        ));
    }
    Ok(words)
}

pub struct VulkanShader {
    pub(crate) id: ResourceId,
    label: String,
    layout: VertexLayout,
    pub(crate) vertex: vk::ShaderModule,
    pub(crate) fragment: vk::ShaderModule,
    pub(crate) vertex_entry: CString,
    pub(crate) fragment_entry: CString,
    ctx: Arc<GpuContext>,
    alive: AliveFlag,
}

impl VulkanShader {
    pub fn create(ctx: &Arc<GpuContext>, desc: &ShaderDesc) -> Result<Arc<Self>> {
        desc.validate()?;
        ctx.require_alive("create_shader")?;

        let vertex_words = spirv_words(&desc.label, "vertex", &desc.vertex.bytecode)?;
        let fragment_words = spirv_words(&desc.label, "fragment", &desc.fragment.bytecode)?;
        let vertex_entry = entry_point(&desc.label, &desc.vertex.entry_point)?;
        let fragment_entry = entry_point(&desc.label, &desc.fragment.entry_point)?;

        let vertex = create_module(ctx, &desc.label, &vertex_words)?;
        let fragment = match create_module(ctx, &desc.label, &fragment_words) {
            Ok(module) => module,
            Err(e) => {
                unsafe { ctx.device.destroy_shader_module(vertex, None) };
                return Err(e);
            }
        };

        tetra_render::render_debug!(SOURCE, "Created shader '{}' ({:?} layout)", desc.label, desc.layout);
        Ok(Arc::new(Self {
            id: ResourceId::next(),
            label: desc.label.clone(),
            layout: desc.layout,
            vertex,
            fragment,
            vertex_entry,
            fragment_entry,
            ctx: Arc::clone(ctx),
            alive: AliveFlag::new(),
        }))
    }

    /// Downcast a shared handle, rejecting expired or foreign shaders
    pub(crate) fn from_handle(handle: &ShaderRef) -> Result<&VulkanShader> {
        if !handle.is_alive() {
            return Err(tetra_render::render_warn_err!(SOURCE, "Shader '{}' has expired", handle.label()));
        }
        handle.as_any().downcast_ref::<VulkanShader>().ok_or_else(|| {
            tetra_render::render_warn_err!(SOURCE, "Shader '{}' was not created by the Vulkan backend", handle.label())
        })
    }
}

fn entry_point(label: &str, name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| {
        Error::InvalidResource(format!("Shader '{}' entry point '{}' contains a NUL byte", label, name))
    })
}

fn create_module(ctx: &GpuContext, label: &str, words: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(words);
    unsafe {
        ctx.device
            .create_shader_module(&create_info, None)
            .map_err(|e| vk_err(SOURCE, &format!("Failed to create shader module for '{}'", label), e))
    }
}

impl GpuResource for VulkanShader {
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
        unsafe {
            self.ctx.device.destroy_shader_module(self.vertex, None);
            self.ctx.device.destroy_shader_module(self.fragment, None);
        }
    }
}

impl Shader for VulkanShader {
    fn layout(&self) -> VertexLayout {
        self.layout
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
