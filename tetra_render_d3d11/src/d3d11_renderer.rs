/// Dx11Renderer - Direct3D 11 implementation of the Renderer trait
///
/// No command lists or fences: the driver orders the immediate context.
/// `begin_render` sets and clears the targets, the application drains the
/// queue into `context()`, `end_render` resolves MSAA and presents.
///
/// Shadows are not rendered on this backend; slot 4 samples as fully lit.

use std::sync::Arc;
use tetra_render::{
    BackendKind, Error, FrameStatus, FrameTiming, Lifecycle, LifecycleState, RenderCommandQueue, RenderContext,
    Renderer, RendererConfig, RendererStats, Result, SkipReason,
};

use crate::d3d11_context::GpuContext;
use crate::d3d11_convert::{hr_err, hr_init_err, BACK_BUFFER_FORMAT, DXGI_FORMAT_D32_FLOAT};
use crate::d3d11_render_context::Dx11RenderContext;
use crate::device::{ContextCall, Dx11Device, NativeHandle, SwapchainDesc, Texture2DDesc, ViewKind};

const SOURCE: &str = "tetra::d3d11";

const BACK_BUFFER_COUNT: u32 = 2;

/// A texture and the one view the renderer uses it through
#[derive(Debug, Clone, Copy)]
struct ViewedTexture {
    resource: NativeHandle,
    view: NativeHandle,
}

impl ViewedTexture {
    fn create(device: &dyn Dx11Device, label: &str, desc: Texture2DDesc, view: ViewKind) -> Result<Self> {
        let resource = device
            .create_texture2d(label, &desc, &[])
            .map_err(|hr| hr_err(SOURCE, &format!("Failed to create {}", label), hr))?;
        match device.create_view(resource, view) {
            Ok(view) => Ok(Self { resource, view }),
            Err(hr) => {
                device.release(resource);
                Err(hr_err(SOURCE, &format!("Failed to create {} view", label), hr))
            }
        }
    }

    fn release(self, device: &dyn Dx11Device) {
        device.release(self.view);
        device.release(self.resource);
    }
}

/// Everything that depends on the swapchain size
#[derive(Default)]
struct SwapchainTargets {
    back_buffer: Option<ViewedTexture>,
    /// Multisampled color target resolved into the back buffer
    msaa_color: Option<ViewedTexture>,
    depth: Option<ViewedTexture>,
}

impl SwapchainTargets {
    fn create(device: &dyn Dx11Device, swapchain: NativeHandle, desc: &SwapchainDesc, samples: u32) -> Result<Self> {
        let mut targets = Self::default();
        if let Err(e) = targets.build(device, swapchain, desc, samples) {
            targets.release(device);
            return Err(e);
        }
        Ok(targets)
    }

    fn build(&mut self, device: &dyn Dx11Device, swapchain: NativeHandle, desc: &SwapchainDesc, samples: u32) -> Result<()> {
        let resource = device
            .swapchain_buffer(swapchain)
            .map_err(|hr| hr_err(SOURCE, "Failed to get back buffer", hr))?;
        match device.create_view(resource, ViewKind::RenderTarget { format: BACK_BUFFER_FORMAT }) {
            Ok(view) => self.back_buffer = Some(ViewedTexture { resource, view }),
            Err(hr) => {
                device.release(resource);
                return Err(hr_err(SOURCE, "Failed to create back-buffer RTV", hr));
            }
        }

        let texture = |format, render_target, depth_stencil| Texture2DDesc {
            width: desc.width,
            height: desc.height,
            array_size: 1,
            format,
            samples,
            cube: false,
            shader_resource: false,
            render_target,
            depth_stencil,
        };
        if samples > 1 {
            self.msaa_color = Some(ViewedTexture::create(
                device,
                "msaa color",
                texture(BACK_BUFFER_FORMAT, true, false),
                ViewKind::RenderTarget { format: BACK_BUFFER_FORMAT },
            )?);
        }
        self.depth = Some(ViewedTexture::create(
            device,
            "depth buffer",
            texture(DXGI_FORMAT_D32_FLOAT, false, true),
            ViewKind::DepthStencil { format: DXGI_FORMAT_D32_FLOAT },
        )?);
        Ok(())
    }

    /// (color target, depth target) of the main pass
    fn outputs(&self) -> Result<(NativeHandle, NativeHandle)> {
        let color = self
            .msaa_color
            .or(self.back_buffer)
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Color target missing"))?;
        let depth = self
            .depth
            .ok_or_else(|| tetra_render::render_err!(SOURCE, "Depth buffer missing"))?;
        Ok((color.view, depth.view))
    }

    /// Release every reference; targets must be unbound first
    fn release(&mut self, device: &dyn Dx11Device) {
        for target in [self.back_buffer.take(), self.msaa_color.take(), self.depth.take()].into_iter().flatten() {
            target.release(device);
        }
    }
}

/// Everything built by `initialize` and torn down by `cleanup`
struct Presentation {
    swapchain: NativeHandle,
    swapchain_desc: SwapchainDesc,
    samples: u32,
    targets: SwapchainTargets,
}

impl Presentation {
    fn destroy(&mut self, device: &dyn Dx11Device) {
        device.call(ContextCall::OMSetRenderTargets { rtv: None, dsv: None });
        self.targets.release(device);
        if !self.swapchain.is_null() {
            device.release(self.swapchain);
            self.swapchain = NativeHandle::NULL;
        }
    }
}

pub struct Dx11Renderer {
    config: RendererConfig,
    lifecycle: Lifecycle,
    timing: FrameTiming,
    stats: RendererStats,

    gpu: Arc<GpuContext>,
    context: Dx11RenderContext,
    presentation: Option<Presentation>,

    width: u32,
    height: u32,
    minimized: bool,
    /// Resize the swapchain before the next frame
    swapchain_dirty: bool,
}

impl Dx11Renderer {
    /// Wrap an already created device and immediate context
    pub fn new(device: Arc<dyn Dx11Device>, config: RendererConfig) -> Self {
        if config.enable_validation {
            tetra_render::render_debug!(SOURCE, "Validation requested; the injected device owns the debug layer");
        }
        tetra_render::render_info!(SOURCE, "D3D11 adapter '{}'", device.adapter_name());
        let gpu = GpuContext::new(device);
        Self {
            width: config.width,
            height: config.height,
            config,
            lifecycle: Lifecycle::new(),
            timing: FrameTiming::new(),
            stats: RendererStats::default(),
            context: Dx11RenderContext::new(Arc::clone(&gpu)),
            gpu,
            presentation: None,
            minimized: false,
            swapchain_dirty: false,
        }
    }

    fn create_presentation(&self) -> Result<Presentation> {
        let device = self.gpu.device.as_ref();
        let samples = self.config.msaa_samples(device.max_sample_count(BACK_BUFFER_FORMAT));
        let swapchain_desc = SwapchainDesc {
            width: self.width,
            height: self.height,
            buffer_count: BACK_BUFFER_COUNT,
            format: BACK_BUFFER_FORMAT,
        };
        let swapchain = device
            .create_swapchain(&swapchain_desc)
            .map_err(|hr| hr_init_err(SOURCE, "Failed to create swapchain", hr))?;
        let targets = match SwapchainTargets::create(device, swapchain, &swapchain_desc, samples) {
            Ok(targets) => targets,
            Err(e) => {
                device.release(swapchain);
                return Err(e);
            }
        };
        Ok(Presentation { swapchain, swapchain_desc, samples, targets })
    }

    /// Resize the swapchain buffers to the current window size
    fn recreate_swapchain(&mut self) -> Result<()> {
        let Some(presentation) = self.presentation.as_mut() else {
            return Ok(());
        };
        let device = self.gpu.device.as_ref();

        // The bound RTV holds a back-buffer reference
        device.call(ContextCall::OMSetRenderTargets { rtv: None, dsv: None });
        presentation.targets.release(device);
        device
            .resize_buffers(presentation.swapchain, self.width, self.height)
            .map_err(|hr| hr_err(SOURCE, "Failed to resize swapchain buffers", hr))?;
        presentation.swapchain_desc.width = self.width;
        presentation.swapchain_desc.height = self.height;
        presentation.targets = SwapchainTargets::create(
            device,
            presentation.swapchain,
            &presentation.swapchain_desc,
            presentation.samples,
        )?;
        self.swapchain_dirty = false;

        tetra_render::render_debug!(SOURCE, "Swapchain resized to {}x{}", self.width, self.height);
        Ok(())
    }

    fn start_frame(&mut self) -> Result<FrameStatus> {
        if self.minimized {
            return Ok(FrameStatus::Skipped(SkipReason::Minimized));
        }
        if self.swapchain_dirty {
            self.recreate_swapchain()?;
        }

        let presentation = self
            .presentation
            .as_ref()
            .ok_or_else(|| Error::InvalidState("begin_render before initialize".to_string()))?;
        let device = self.gpu.device.as_ref();
        let (rtv, dsv) = presentation.targets.outputs()?;

        device.call(ContextCall::OMSetRenderTargets { rtv: Some(rtv), dsv: Some(dsv) });
        device.call(ContextCall::RSSetViewport {
            width: presentation.swapchain_desc.width,
            height: presentation.swapchain_desc.height,
        });
        device.call(ContextCall::ClearRenderTargetView { rtv, color: self.config.clear_color });
        device.call(ContextCall::ClearDepthStencilView { dsv, depth: 1.0 });
        self.context.begin_frame()?;
        Ok(FrameStatus::Ready)
    }

    /// Samples actually used by the main target (after clamping to device support)
    pub fn msaa_samples(&self) -> u32 {
        self.presentation.as_ref().map_or_else(
            || self.config.msaa_samples(self.gpu.device.max_sample_count(BACK_BUFFER_FORMAT)),
            |p| p.samples,
        )
    }
}

impl Renderer for Dx11Renderer {
    fn backend(&self) -> BackendKind {
        BackendKind::D3D11
    }

    fn initialize(&mut self) -> Result<()> {
        if self.lifecycle.state() != LifecycleState::Uninitialized {
            return self.lifecycle.initialized();
        }
        let mut presentation = self.create_presentation()?;
        if let Err(e) = self.context.init_frame_resources(presentation.samples) {
            presentation.destroy(self.gpu.device.as_ref());
            return Err(e);
        }

        tetra_render::render_info!(
            SOURCE,
            "Initialized: {}x{}, {}x MSAA",
            presentation.swapchain_desc.width,
            presentation.swapchain_desc.height,
            presentation.samples
        );
        if self.config.shadow.enabled {
            tetra_render::render_debug!(SOURCE, "Shadow mapping is not implemented on D3D11; scenes render unshadowed");
        }
        self.presentation = Some(presentation);
        self.lifecycle.initialized()
    }

    fn begin_render(&mut self, _queue: &RenderCommandQueue) -> Result<FrameStatus> {
        self.lifecycle.begin()?;
        self.stats.reset_frame();

        match self.start_frame() {
            Ok(FrameStatus::Ready) => Ok(FrameStatus::Ready),
            Ok(FrameStatus::Skipped(reason)) => {
                self.lifecycle.abandon_frame();
                self.stats.skipped_frames += 1;
                tetra_render::render_debug!(SOURCE, "Frame skipped: {:?}", reason);
                Ok(FrameStatus::Skipped(reason))
            }
            Err(e) => {
                self.context.abandon_frame();
                self.lifecycle.abandon_frame();
                Err(e)
            }
        }
    }

    fn end_render(&mut self) -> Result<FrameStatus> {
        self.lifecycle.end()?;
        let draws = self.context.end_frame();
        self.stats.draw_calls = draws.draw_calls;
        self.stats.pipeline_binds = draws.pipeline_binds;
        self.stats.descriptor_allocations = draws.descriptor_allocations;

        let Some(presentation) = self.presentation.as_ref() else {
            return Err(Error::InvalidState("end_render before initialize".to_string()));
        };
        let device = self.gpu.device.as_ref();
        if let (Some(msaa), Some(back_buffer)) = (presentation.targets.msaa_color, presentation.targets.back_buffer) {
            device.call(ContextCall::ResolveSubresource {
                dst: back_buffer.resource,
                src: msaa.resource,
                format: BACK_BUFFER_FORMAT,
            });
        }

        let sync_interval = u32::from(self.config.vsync);
        device
            .present(presentation.swapchain, sync_interval)
            .map_err(|hr| hr_err(SOURCE, "Failed to present", hr))?;

        self.stats.presented_frames += 1;
        self.timing.tick();
        Ok(FrameStatus::Ready)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.lifecycle.require_initialized("resize")?;
        if width == 0 || height == 0 {
            tetra_render::render_debug!(SOURCE, "Minimized");
            self.minimized = true;
            return Ok(());
        }

        self.minimized = false;
        self.width = width;
        self.height = height;
        self.swapchain_dirty = true;
        // Targets are bound until end_render; mid-frame resizes wait for the next frame
        if self.lifecycle.state() == LifecycleState::Initialized {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        if !self.lifecycle.cleaned_up() {
            return;
        }
        if !self.gpu.is_alive() {
            return;
        }
        tetra_render::render_info!(SOURCE, "Cleaning up");

        let device = self.gpu.device.as_ref();
        if let Some(mut presentation) = self.presentation.take() {
            presentation.destroy(device);
        }
        self.context.destroy();
        if let Err(hr) = device.flush() {
            tetra_render::render_warn!(SOURCE, "Flush failed during cleanup: HRESULT 0x{:08X}", hr as u32);
        }
        self.gpu.retire();
    }

    fn context(&mut self) -> &mut dyn RenderContext {
        &mut self.context
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    fn stats(&self) -> RendererStats {
        let mut stats = self.stats;
        stats.live_sync_objects = 0;
        stats.cached_pipelines = self.context.cached_states() as u32;
        stats
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.require_alive("wait_idle")?;
        self.gpu
            .device
            .flush()
            .map_err(|hr| hr_err(SOURCE, "Failed to flush the immediate context", hr))
    }
}

impl Drop for Dx11Renderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
#[path = "d3d11_renderer_tests.rs"]
mod tests;
