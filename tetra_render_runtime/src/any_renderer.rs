/// AnyRenderer - the renderer of whichever backend was selected
///
/// A closed set: applications match on the variant only to reach
/// backend-specific extras; everything else goes through `Renderer`.

use glam::Mat4;
use tetra_render::{
    BackendKind, FrameStatus, FrameTiming, LifecycleState, RenderCommandQueue, RenderContext, Renderer,
    RendererStats, Result, ShaderRef,
};
use tetra_render_d3d11::Dx11Renderer;
use tetra_render_d3d12::Dx12Renderer;
use tetra_render_gl::GlRenderer;
use tetra_render_vulkan::VulkanRenderer;

pub enum AnyRenderer {
    Vulkan(VulkanRenderer),
    D3D12(Dx12Renderer),
    D3D11(Dx11Renderer),
    OpenGl(GlRenderer),
}

macro_rules! dispatch {
    ($self:expr, $renderer:ident => $body:expr) => {
        match $self {
            AnyRenderer::Vulkan($renderer) => $body,
            AnyRenderer::D3D12($renderer) => $body,
            AnyRenderer::D3D11($renderer) => $body,
            AnyRenderer::OpenGl($renderer) => $body,
        }
    };
}

impl AnyRenderer {
    /// MSAA samples of the main target after clamping to device support
    pub fn msaa_samples(&self) -> u32 {
        dispatch!(self, r => r.msaa_samples())
    }

    pub fn as_renderer(&mut self) -> &mut dyn Renderer {
        dispatch!(self, r => r)
    }
}

impl Renderer for AnyRenderer {
    fn backend(&self) -> BackendKind {
        dispatch!(self, r => r.backend())
    }

    fn initialize(&mut self) -> Result<()> {
        dispatch!(self, r => r.initialize())
    }

    fn begin_render(&mut self, queue: &RenderCommandQueue) -> Result<FrameStatus> {
        dispatch!(self, r => r.begin_render(queue))
    }

    fn end_render(&mut self) -> Result<FrameStatus> {
        dispatch!(self, r => r.end_render())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        dispatch!(self, r => r.resize(width, height))
    }

    fn cleanup(&mut self) {
        dispatch!(self, r => r.cleanup())
    }

    fn context(&mut self) -> &mut dyn RenderContext {
        dispatch!(self, r => r.context())
    }

    fn state(&self) -> LifecycleState {
        dispatch!(self, r => r.state())
    }

    fn timing(&self) -> &FrameTiming {
        dispatch!(self, r => r.timing())
    }

    fn stats(&self) -> RendererStats {
        dispatch!(self, r => r.stats())
    }

    fn wait_idle(&mut self) -> Result<()> {
        dispatch!(self, r => r.wait_idle())
    }

    fn set_shadow_view_projection(&mut self, view_projection: Mat4) {
        dispatch!(self, r => r.set_shadow_view_projection(view_projection))
    }

    fn set_shadow_shader(&mut self, shader: Option<ShaderRef>) {
        dispatch!(self, r => r.set_shadow_shader(shader))
    }
}

#[cfg(test)]
#[path = "any_renderer_tests.rs"]
mod tests;
